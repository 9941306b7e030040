//! Emulation platform boundary.
//!
//! A platform turns a [`NetworkPlan`] into live virtual hosts. The rest of the
//! crate only talks to the traits in this module:
//!
//! - [`EmulationPlatform::realize`] instantiates hosts, switches and links
//! - [`RealizedNetwork`] resolves hosts, checks connectivity and tears down
//! - [`VirtualHost`] resolves addresses and spawns processes inside the host
//!
//! Two platforms ship with the crate: [`netns::NetnsPlatform`] builds the
//! network out of Linux network namespaces, bridges, veth pairs and `tc netem`;
//! [`local::LocalPlatform`] runs everything directly on the machine and is used
//! for tests and dry runs.

pub mod local;
pub mod netns;

pub use local::LocalPlatform;
pub use netns::NetnsPlatform;

use crate::topology::NetworkPlan;
use std::collections::BTreeMap;
use std::fs::File;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("command `{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("could not run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown host {0}")]
    UnknownHost(String),

    #[error("network was already torn down")]
    TornDown,
}

/// Everything needed to start a process inside a virtual host
#[derive(Debug)]
pub struct SpawnRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Added on top of the orchestrator's own environment
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub stdout: File,
    pub stderr: File,
}

/// Outcome of a connectivity check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReport {
    pub sent: usize,
    pub received: usize,
}

impl PingReport {
    /// Packet loss in percent; 0 when nothing was sent
    pub fn loss_percent(&self) -> f64 {
        if self.sent == 0 {
            return 0.0;
        }
        100.0 * (self.sent - self.received) as f64 / self.sent as f64
    }
}

/// Live handle to one emulated host
pub trait VirtualHost {
    fn name(&self) -> &str;

    /// Primary address of the host (the backbone address for edges)
    fn ip(&self) -> Ipv4Addr;

    /// Address of the host's interface attached to `switch`
    fn interface_ip(&self, switch: &str) -> Option<Ipv4Addr>;

    /// Start a process in the host's namespace
    fn spawn(&self, request: SpawnRequest) -> Result<Child, PlatformError>;
}

/// A plan that has been instantiated by a platform
pub trait RealizedNetwork {
    fn host(&self, name: &str) -> Result<&dyn VirtualHost, PlatformError>;

    /// Ping every ordered pair of `hosts` once
    fn ping(&self, hosts: &[&str], timeout: Duration) -> Result<PingReport, PlatformError>;

    /// Remove every host, switch and link. Only the first call has an effect.
    fn teardown(&mut self) -> Result<(), PlatformError>;
}

pub trait EmulationPlatform {
    fn name(&self) -> &'static str;

    fn realize(&self, plan: &NetworkPlan) -> Result<Box<dyn RealizedNetwork>, PlatformError>;
}

/// Interfaces of every host of the plan as `(switch, address)` pairs
pub(crate) fn host_interfaces(plan: &NetworkPlan) -> BTreeMap<String, Vec<(String, Ipv4Addr)>> {
    let mut interfaces: BTreeMap<String, Vec<(String, Ipv4Addr)>> = BTreeMap::new();
    for link in &plan.links {
        interfaces
            .entry(link.host.clone())
            .or_default()
            .push((link.switch.clone(), link.address));
    }
    interfaces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{build_plan, TopologyParams};

    #[test]
    fn test_loss_percent() {
        assert_eq!(PingReport { sent: 0, received: 0 }.loss_percent(), 0.0);
        assert_eq!(PingReport { sent: 4, received: 3 }.loss_percent(), 25.0);
        assert_eq!(PingReport { sent: 30, received: 0 }.loss_percent(), 100.0);
    }

    #[test]
    fn test_edges_have_two_interfaces() {
        let params = TopologyParams { total_cores: 32, ..TopologyParams::default() };
        let plan = build_plan(&params, 3).unwrap();
        let interfaces = host_interfaces(&plan);

        assert_eq!(interfaces["origin"], vec![("s0".to_string(), plan.origin.ip)]);
        assert_eq!(
            interfaces["e2"],
            vec![
                ("s0".to_string(), plan.edges[1].host.ip),
                ("s2".to_string(), plan.edges[1].client_facing_ip),
            ]
        );
        assert_eq!(interfaces["x2"].len(), 1);
        assert_eq!(interfaces["x2"][0].0, "s3");
    }
}
