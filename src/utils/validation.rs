//! Network plan validation.
//!
//! Re-checks the invariants of a built [`NetworkPlan`] before it is handed to
//! an emulation platform: unique addresses drawn from their declared subnets,
//! every client bound to an existing edge, links referencing known nodes and
//! dedicated core ranges that do not overlap.

use crate::topology::NetworkPlan;
use std::collections::{BTreeMap, BTreeSet};

/// Validate the invariants of a network plan
///
/// # Returns
/// * `Ok(())` if the plan is consistent
/// * `Err(String)` describing the first violation found
pub fn validate_plan(plan: &NetworkPlan) -> Result<(), String> {
    let mut owners = BTreeMap::new();
    for link in &plan.links {
        if let Some(owner) = owners.insert(link.address, link.host.as_str()) {
            return Err(format!(
                "Duplicate address {} on {} and {}",
                link.address, owner, link.host
            ));
        }
    }

    if !plan.backbone.contains(&plan.origin.ip) {
        return Err(format!("Origin address {} outside backbone {}", plan.origin.ip, plan.backbone));
    }
    for edge in &plan.edges {
        if !plan.backbone.contains(&edge.host.ip) {
            return Err(format!(
                "Edge {} address {} outside backbone {}",
                edge.host.name, edge.host.ip, plan.backbone
            ));
        }
        if !edge.client_subnet.contains(&edge.client_facing_ip) {
            return Err(format!(
                "Edge {} client address {} outside {}",
                edge.host.name, edge.client_facing_ip, edge.client_subnet
            ));
        }
    }

    for client in &plan.clients {
        let edge = plan
            .edges
            .get(client.edge)
            .ok_or_else(|| format!("Client {} assigned to missing edge {}", client.host.name, client.edge))?;
        if !edge.client_subnet.contains(&client.host.ip) {
            return Err(format!(
                "Client {} address {} outside subnet {} of {}",
                client.host.name, client.host.ip, edge.client_subnet, edge.host.name
            ));
        }
    }

    let switches: BTreeSet<&str> = plan.switches.iter().map(|s| s.name.as_str()).collect();
    for link in &plan.links {
        if !switches.contains(link.switch.as_str()) {
            return Err(format!("Link of {} references unknown switch {}", link.host, link.switch));
        }
        if plan.host(&link.host).is_none() {
            return Err(format!("Link on {} references unknown host {}", link.switch, link.host));
        }
    }

    let mut dedicated = BTreeMap::new();
    for host in std::iter::once(&plan.origin).chain(plan.edges.iter().map(|e| &e.host)) {
        for core in host.cores.cores() {
            if let Some(other) = dedicated.insert(*core, host.name.as_str()) {
                return Err(format!("Core {} dedicated to both {} and {}", core, other, host.name));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{build_plan, CoreSet, TopologyParams};

    fn plan() -> NetworkPlan {
        let params = TopologyParams { total_cores: 32, ..TopologyParams::default() };
        build_plan(&params, 12).unwrap()
    }

    #[test]
    fn test_built_plans_are_valid() {
        assert!(validate_plan(&plan()).is_ok());
    }

    #[test]
    fn test_duplicate_address() {
        let mut plan = plan();
        let origin_ip = plan.origin.ip;
        plan.links[3].address = origin_ip;
        assert!(validate_plan(&plan).unwrap_err().contains("Duplicate address"));
    }

    #[test]
    fn test_client_on_missing_edge() {
        let mut plan = plan();
        plan.clients[0].edge = 9;
        assert!(validate_plan(&plan).unwrap_err().contains("missing edge"));
    }

    #[test]
    fn test_client_outside_subnet() {
        let mut plan = plan();
        plan.clients[1].edge = 0;
        assert!(validate_plan(&plan).unwrap_err().contains("outside subnet"));
    }

    #[test]
    fn test_overlapping_cores() {
        let mut plan = plan();
        plan.edges[2].host.cores = CoreSet::new(vec![2]);
        assert!(validate_plan(&plan).unwrap_err().contains("Core 2"));
    }
}
