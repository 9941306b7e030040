//! IP address registry.
//!
//! Tracks which host owns which address across every subnet of the plan so a
//! misconfigured (overlapping) layout is caught at build time.

use super::allocator::AllocationError;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Central registry of all addresses assigned in a network plan
#[derive(Debug, Default)]
pub struct IpRegistry {
    /// IP -> owning host
    assigned: BTreeMap<Ipv4Addr, String>,
}

impl IpRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ip` as owned by `host`
    pub fn register(&mut self, ip: Ipv4Addr, host: &str) -> Result<(), AllocationError> {
        if let Some(owner) = self.assigned.get(&ip) {
            return Err(AllocationError::AddressConflict {
                ip,
                owner: owner.clone(),
                requested_by: host.to_string(),
            });
        }
        self.assigned.insert(ip, host.to_string());
        Ok(())
    }

    pub fn is_assigned(&self, ip: Ipv4Addr) -> bool {
        self.assigned.contains_key(&ip)
    }

    /// Host that owns a given IP
    pub fn owner(&self, ip: Ipv4Addr) -> Option<&str> {
        self.assigned.get(&ip).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}
