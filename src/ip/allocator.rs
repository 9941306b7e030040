//! Subnet allocation logic.
//!
//! A [`SubnetAllocator`] walks the host addresses of one CIDR block in order.
//! It never wraps around: running out of addresses is a misconfiguration of
//! the experiment and surfaces as [`AllocationError::SubnetExhausted`].

use ipnet::{Ipv4AddrRange, Ipv4Net};
use std::net::Ipv4Addr;

/// Errors raised while laying out the addresses of the network plan
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("subnet {subnet} has no free host address left (requested by {requested_by})")]
    SubnetExhausted { subnet: Ipv4Net, requested_by: String },

    #[error("address {ip} requested by {requested_by} is already assigned to {owner}")]
    AddressConflict {
        ip: Ipv4Addr,
        owner: String,
        requested_by: String,
    },

    #[error("the network needs at least one edge")]
    NoEdges,

    #[error("{subnets} client subnets given for {edges} edges")]
    SubnetCountMismatch { edges: usize, subnets: usize },
}

/// Forward-only iterator over the host addresses of a subnet
#[derive(Debug, Clone)]
pub struct SubnetAllocator {
    subnet: Ipv4Net,
    hosts: Ipv4AddrRange,
    handed_out: usize,
}

impl SubnetAllocator {
    pub fn new(subnet: Ipv4Net) -> Self {
        // Normalise "10.1.2.3/16" to "10.1.0.0/16" before enumerating hosts
        let subnet = subnet.trunc();
        Self {
            subnet,
            hosts: subnet.hosts(),
            handed_out: 0,
        }
    }

    pub fn subnet(&self) -> Ipv4Net {
        self.subnet
    }

    /// Number of addresses handed out so far
    pub fn handed_out(&self) -> usize {
        self.handed_out
    }

    /// Take the next unused host address of the block.
    ///
    /// `requested_by` names the host asking for it and only feeds the error.
    pub fn next_host(&mut self, requested_by: &str) -> Result<Ipv4Addr, AllocationError> {
        match self.hosts.next() {
            Some(ip) => {
                self.handed_out += 1;
                Ok(ip)
            }
            None => Err(AllocationError::SubnetExhausted {
                subnet: self.subnet,
                requested_by: requested_by.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hands_out_hosts_in_order() {
        let mut alloc = SubnetAllocator::new("10.0.0.0/16".parse().unwrap());
        assert_eq!(alloc.next_host("origin").unwrap(), Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(alloc.next_host("e1").unwrap(), Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(alloc.handed_out(), 2);
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        // A /30 has exactly two usable host addresses
        let mut alloc = SubnetAllocator::new("10.9.0.0/30".parse().unwrap());
        assert!(alloc.next_host("a").is_ok());
        assert!(alloc.next_host("b").is_ok());

        let err = alloc.next_host("c").unwrap_err();
        assert_eq!(
            err,
            AllocationError::SubnetExhausted {
                subnet: "10.9.0.0/30".parse().unwrap(),
                requested_by: "c".to_string(),
            }
        );
        // Still exhausted, never wraps around
        assert!(alloc.next_host("d").is_err());
    }

    #[test]
    fn test_subnet_is_truncated() {
        let mut alloc = SubnetAllocator::new("10.3.7.9/16".parse().unwrap());
        assert_eq!(alloc.subnet().to_string(), "10.3.0.0/16");
        assert_eq!(alloc.next_host("x").unwrap(), Ipv4Addr::new(10, 3, 0, 1));
    }
}
