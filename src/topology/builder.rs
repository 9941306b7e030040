//! Network plan construction.
//!
//! Lays out the origin, the edges and `num_clients` clients, wiring
//! addresses, link delays and CPU cores. The result only depends on the
//! parameters and the seed, so the same inputs always give the same plan.

use super::cores::CoreAllocator;
use super::latency::link_delay;
use super::types::{ClientSpec, CoreSet, EdgeSpec, HostRole, HostSpec, LinkSpec, NetworkPlan, SwitchSpec};
use crate::ip::{AllocationError, IpRegistry, SubnetAllocator};
use ipnet::Ipv4Net;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::Ipv4Addr;

/// Inputs of [`build_plan`]
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyParams {
    pub seed: u64,
    /// Origin <-> edges network
    pub backbone: Ipv4Net,
    /// One client subnet per edge
    pub client_subnets: Vec<Ipv4Net>,
    /// Origin <-> edge distance, one entry per edge
    pub edge_distances_km: Vec<u32>,
    /// Inclusive range client <-> edge distances are drawn from
    pub client_distance_km: (u32, u32),
    pub total_cores: usize,
    pub reserved_cores: usize,
    pub origin_cores: usize,
    pub edge_cores: usize,
}

impl Default for TopologyParams {
    fn default() -> Self {
        Self {
            seed: 42,
            backbone: net16(0),
            client_subnets: (1..=5).map(net16).collect(),
            edge_distances_km: vec![0, 1000, 1000, 1000, 1000],
            client_distance_km: (50, 500),
            total_cores: num_cpus::get(),
            reserved_cores: 2,
            origin_cores: 1,
            edge_cores: 2,
        }
    }
}

impl TopologyParams {
    pub fn num_edges(&self) -> usize {
        self.edge_distances_km.len()
    }
}

/// `10.<second>.0.0/16`
pub fn net16(second: u8) -> Ipv4Net {
    let base = Ipv4Addr::new(10, second, 0, 0);
    Ipv4Net::new(base, 16).unwrap_or_else(|_| Ipv4Net::from(base))
}

/// Host name of the edge at `index`
pub fn edge_name(index: usize) -> String {
    format!("e{}", index + 1)
}

/// Host name of the client at `index`
pub fn client_name(index: usize) -> String {
    format!("x{}", index)
}

/// Build the network plan for `num_clients` clients.
///
/// Clients are assigned round-robin, client `i` to edge `i % num_edges`.
/// Fails if any subnet runs out of addresses, or if there are no edges or not
/// exactly one client subnet per edge.
pub fn build_plan(params: &TopologyParams, num_clients: usize) -> Result<NetworkPlan, AllocationError> {
    if params.num_edges() == 0 {
        return Err(AllocationError::NoEdges);
    }
    if params.client_subnets.len() != params.num_edges() {
        return Err(AllocationError::SubnetCountMismatch {
            edges: params.num_edges(),
            subnets: params.client_subnets.len(),
        });
    }
    let mut rng = StdRng::seed_from_u64(params.seed);
    let mut registry = IpRegistry::new();
    let mut cores = CoreAllocator::new(params.total_cores, params.reserved_cores);
    let mut switches = Vec::new();
    let mut links = Vec::new();

    let mut backbone = SubnetAllocator::new(params.backbone);
    let backbone_prefix = backbone.subnet().prefix_len();

    // Origin and the origin <-> edges switch
    let origin_ip = backbone.next_host("origin")?;
    registry.register(origin_ip, "origin")?;
    let origin = HostSpec {
        name: "origin".to_string(),
        role: HostRole::Origin,
        ip: origin_ip,
        cores: cores.reserve(params.origin_cores),
    };
    let backbone_switch = "s0".to_string();
    switches.push(SwitchSpec { name: backbone_switch.clone() });
    links.push(LinkSpec {
        switch: backbone_switch.clone(),
        host: origin.name.clone(),
        address: origin_ip,
        prefix_len: backbone_prefix,
        delay: None,
    });

    // Edges on the backbone, delayed by their distance to the origin
    let mut edges = Vec::with_capacity(params.num_edges());
    for (index, &distance_km) in params.edge_distances_km.iter().enumerate() {
        let name = edge_name(index);
        let ip = backbone.next_host(&name)?;
        registry.register(ip, &name)?;
        let backbone_delay = link_delay(distance_km);
        links.push(LinkSpec {
            switch: backbone_switch.clone(),
            host: name.clone(),
            address: ip,
            prefix_len: backbone_prefix,
            delay: Some(backbone_delay),
        });
        edges.push((
            HostSpec {
                name,
                role: HostRole::Edge,
                ip,
                cores: cores.reserve(params.edge_cores),
            },
            distance_km,
            backbone_delay,
        ));
    }

    // Each edge's client switch and its own address in the client subnet
    let mut client_nets: Vec<SubnetAllocator> = params
        .client_subnets
        .iter()
        .map(|net| SubnetAllocator::new(*net))
        .collect();
    let mut edge_specs = Vec::with_capacity(edges.len());
    for (index, ((host, distance_km, backbone_delay), net)) in
        edges.into_iter().zip(client_nets.iter_mut()).enumerate()
    {
        let client_switch = format!("s{}", index + 1);
        switches.push(SwitchSpec { name: client_switch.clone() });
        let client_facing_ip = net.next_host(&host.name)?;
        registry.register(client_facing_ip, &host.name)?;
        links.push(LinkSpec {
            switch: client_switch.clone(),
            host: host.name.clone(),
            address: client_facing_ip,
            prefix_len: net.subnet().prefix_len(),
            delay: None,
        });
        edge_specs.push(EdgeSpec {
            index,
            host,
            distance_km,
            backbone_delay,
            client_switch,
            client_subnet: net.subnet(),
            client_facing_ip,
        });
    }

    // Clients, round-robin over the edges
    let mut client_cores = cores.into_client_cycle();
    let (min_km, max_km) = params.client_distance_km;
    let mut clients = Vec::with_capacity(num_clients);
    for index in 0..num_clients {
        let edge = index % edge_specs.len();
        let edge_spec = &edge_specs[edge];
        let name = client_name(index);
        let distance_km = rng.gen_range(min_km..=max_km);
        let delay = link_delay(distance_km);
        let net = &mut client_nets[edge];
        let ip = net.next_host(&name)?;
        registry.register(ip, &name)?;
        links.push(LinkSpec {
            switch: edge_spec.client_switch.clone(),
            host: name.clone(),
            address: ip,
            prefix_len: net.subnet().prefix_len(),
            delay: Some(delay),
        });
        clients.push(ClientSpec {
            index,
            host: HostSpec {
                name,
                role: HostRole::Client,
                ip,
                cores: client_cores.next().unwrap_or_else(|| CoreSet::single(0)),
            },
            edge,
            distance_km,
            delay,
        });
    }

    log::debug!(
        "Planned {} edges, {} clients, {} addresses",
        edge_specs.len(),
        clients.len(),
        registry.len()
    );

    Ok(NetworkPlan {
        seed: params.seed,
        backbone: backbone.subnet(),
        backbone_switch,
        origin,
        edges: edge_specs,
        clients,
        switches,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params() -> TopologyParams {
        TopologyParams {
            total_cores: 32,
            ..TopologyParams::default()
        }
    }

    #[test]
    fn test_default_layout() {
        let plan = build_plan(&params(), 7).unwrap();

        assert_eq!(plan.origin.ip.to_string(), "10.0.0.1");
        assert_eq!(plan.origin.cores.cores(), &[2]);
        assert_eq!(plan.num_edges(), 5);
        assert_eq!(plan.edges[0].host.name, "e1");
        assert_eq!(plan.edges[0].host.ip.to_string(), "10.0.0.2");
        assert_eq!(plan.edges[4].host.ip.to_string(), "10.0.0.6");
        assert_eq!(plan.edges[0].client_facing_ip.to_string(), "10.1.0.1");
        assert_eq!(plan.edges[3].client_facing_ip.to_string(), "10.4.0.1");
        assert_eq!(plan.edges[0].host.cores.cores(), &[3, 4]);
        assert_eq!(plan.edges[4].host.cores.cores(), &[11, 12]);

        assert_eq!(plan.edges[0].backbone_delay.to_string(), "5.45ms");
        assert_eq!(plan.edges[1].backbone_delay.to_string(), "15.45ms");

        // Client 5 is the second client of edge 0
        assert_eq!(plan.clients[5].edge, 0);
        assert_eq!(plan.clients[5].host.ip.to_string(), "10.1.0.3");
        assert_eq!(plan.clients[5].host.name, "x5");
        assert_eq!(plan.clients[0].host.cores.cores(), &[13]);
    }

    #[test]
    fn test_round_robin_assignment_and_unique_ips() {
        for n in [0, 1, 4, 5, 6, 23] {
            let plan = build_plan(&params(), n).unwrap();
            assert_eq!(plan.num_clients(), n);
            for client in &plan.clients {
                assert_eq!(client.edge, client.index % plan.num_edges());
                assert!(plan.edges[client.edge].client_subnet.contains(&client.host.ip));
            }
            let ips: Vec<_> = plan.hosts().map(|h| h.ip).collect();
            let unique: HashSet<_> = ips.iter().collect();
            assert_eq!(ips.len(), unique.len(), "duplicate address for n = {}", n);
        }
    }

    #[test]
    fn test_empty_client_list() {
        let plan = build_plan(&params(), 0).unwrap();
        assert!(plan.clients.is_empty());
        // origin + 5 backbone links + 5 client-switch links
        assert_eq!(plan.links.len(), 11);
        assert_eq!(plan.switches.len(), 6);
    }

    #[test]
    fn test_client_distances_in_range() {
        let plan = build_plan(&params(), 50).unwrap();
        for client in &plan.clients {
            assert!((50..=500).contains(&client.distance_km));
            assert_eq!(client.delay, link_delay(client.distance_km));
        }
    }

    #[test]
    fn test_same_seed_same_plan() {
        let a = serde_json::to_vec(&build_plan(&params(), 40).unwrap()).unwrap();
        let b = serde_json::to_vec(&build_plan(&params(), 40).unwrap()).unwrap();
        assert_eq!(a, b);

        let other_seed = TopologyParams { seed: 7, ..params() };
        let c = serde_json::to_vec(&build_plan(&other_seed, 40).unwrap()).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_small_backbone_fails() {
        let small = TopologyParams {
            backbone: "10.0.0.0/30".parse().unwrap(),
            ..params()
        };
        match build_plan(&small, 3) {
            Err(AllocationError::SubnetExhausted { requested_by, .. }) => assert_eq!(requested_by, "e2"),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_small_client_subnet_fails() {
        let mut small = params();
        small.client_subnets[0] = "10.1.0.0/30".parse().unwrap();
        // edge 0 takes one address and client 0 the other; client 5 has none left
        assert!(build_plan(&small, 5).is_ok());
        match build_plan(&small, 6) {
            Err(AllocationError::SubnetExhausted { requested_by, .. }) => assert_eq!(requested_by, "x5"),
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_subnets_conflict() {
        let mut overlapping = params();
        overlapping.client_subnets[1] = "10.0.0.0/16".parse().unwrap();
        assert!(matches!(
            build_plan(&overlapping, 0),
            Err(AllocationError::AddressConflict { .. })
        ));
    }

    #[test]
    fn test_inconsistent_params_are_rejected() {
        let mut missing_subnet = params();
        missing_subnet.client_subnets.pop();
        assert_eq!(
            build_plan(&missing_subnet, 3).unwrap_err(),
            AllocationError::SubnetCountMismatch { edges: 5, subnets: 4 }
        );

        let no_edges = TopologyParams {
            edge_distances_km: Vec::new(),
            client_subnets: Vec::new(),
            ..params()
        };
        assert_eq!(build_plan(&no_edges, 3).unwrap_err(), AllocationError::NoEdges);
    }

    #[test]
    fn test_small_machine_shares_cores() {
        let small = TopologyParams { total_cores: 8, ..params() };
        let plan = build_plan(&small, 3).unwrap();
        assert_eq!(plan.origin.cores.cores(), &[2]);
        assert_eq!(plan.edges[2].host.cores.cores(), &[7, 0]);
        assert_eq!(plan.edges[4].host.cores.cores(), &[3, 4]);
        assert!(plan.hosts().all(|h| h.cores.cores().iter().all(|&c| c < 8)));
        assert_eq!(plan.num_clients(), 3);
    }
}
