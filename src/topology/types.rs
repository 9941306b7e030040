//! Topology type definitions.
//!
//! The [`NetworkPlan`] is the immutable description of the emulated network:
//! one origin, a backbone switch, the edge sites with their client switches,
//! and every client host. It is produced once before anything is started and
//! is only read afterwards.

use super::latency::LinkDelay;
use ipnet::Ipv4Net;
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Role a virtual host plays in the experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRole {
    Origin,
    Edge,
    Client,
}

impl HostRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostRole::Origin => "origin",
            HostRole::Edge => "edge",
            HostRole::Client => "client",
        }
    }
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU cores a host is pinned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoreSet(Vec<usize>);

impl CoreSet {
    pub fn new(cores: Vec<usize>) -> Self {
        Self(cores)
    }

    pub fn single(core: usize) -> Self {
        Self(vec![core])
    }

    pub fn cores(&self) -> &[usize] {
        &self.0
    }

    pub fn contains(&self, core: usize) -> bool {
        self.0.contains(&core)
    }
}

/// Formats as a `taskset -c` list, e.g. `3,4`
impl fmt::Display for CoreSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        f.write_str(&list.join(","))
    }
}

/// A virtual host of the plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostSpec {
    pub name: String,
    pub role: HostRole,
    /// Primary address; for edges this is the backbone address
    pub ip: Ipv4Addr,
    pub cores: CoreSet,
}

/// An edge site: the edge host plus its private client subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSpec {
    pub index: usize,
    pub host: HostSpec,
    pub distance_km: u32,
    pub backbone_delay: LinkDelay,
    pub client_switch: String,
    pub client_subnet: Ipv4Net,
    /// Address of the edge inside its client subnet, targeted by clients
    pub client_facing_ip: Ipv4Addr,
}

/// A load-generating client host bound to one edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientSpec {
    pub index: usize,
    pub host: HostSpec,
    /// Index into [`NetworkPlan::edges`]
    pub edge: usize,
    pub distance_km: u32,
    pub delay: LinkDelay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchSpec {
    pub name: String,
}

/// A link between a switch and a host interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSpec {
    pub switch: String,
    pub host: String,
    /// Address configured on the host side of the link
    pub address: Ipv4Addr,
    pub prefix_len: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<LinkDelay>,
}

impl LinkSpec {
    /// Host side address in CIDR notation, e.g. `10.0.0.2/16`
    pub fn cidr(&self) -> String {
        format!("{}/{}", self.address, self.prefix_len)
    }
}

/// Immutable description of the whole emulated network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkPlan {
    pub seed: u64,
    pub backbone: Ipv4Net,
    pub backbone_switch: String,
    pub origin: HostSpec,
    pub edges: Vec<EdgeSpec>,
    pub clients: Vec<ClientSpec>,
    pub switches: Vec<SwitchSpec>,
    pub links: Vec<LinkSpec>,
}

impl NetworkPlan {
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn num_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn client(&self, index: usize) -> Option<&ClientSpec> {
        self.clients.get(index)
    }

    /// Edge a client was assigned to at build time
    pub fn edge_for_client(&self, index: usize) -> Option<&EdgeSpec> {
        self.client(index).and_then(|c| self.edges.get(c.edge))
    }

    /// All hosts, origin first, then edges, then clients
    pub fn hosts(&self) -> impl Iterator<Item = &HostSpec> {
        std::iter::once(&self.origin)
            .chain(self.edges.iter().map(|e| &e.host))
            .chain(self.clients.iter().map(|c| &c.host))
    }

    pub fn host(&self, name: &str) -> Option<&HostSpec> {
        self.hosts().find(|h| h.name == name)
    }

    /// Links attached to a host, in the order they were declared
    pub fn links_of<'a>(&'a self, host: &'a str) -> impl Iterator<Item = &'a LinkSpec> + 'a {
        self.links.iter().filter(move |l| l.host == host)
    }

    /// Names of the origin and every edge host
    pub fn server_names(&self) -> Vec<&str> {
        std::iter::once(self.origin.name.as_str())
            .chain(self.edges.iter().map(|e| e.host.name.as_str()))
            .collect()
    }
}
