//! Platform without isolation.
//!
//! Hosts report their planned addresses and spawn processes directly on the
//! machine. Nothing is routed or delayed, so this is only useful for dry runs
//! of the orchestration itself and for tests.

use super::{host_interfaces, EmulationPlatform, PingReport, PlatformError, RealizedNetwork, SpawnRequest, VirtualHost};
use crate::topology::NetworkPlan;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct LocalPlatform;

impl LocalPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl EmulationPlatform for LocalPlatform {
    fn name(&self) -> &'static str {
        "local"
    }

    fn realize(&self, plan: &NetworkPlan) -> Result<Box<dyn RealizedNetwork>, PlatformError> {
        let interfaces = host_interfaces(plan);
        let hosts = plan
            .hosts()
            .map(|spec| {
                let host = LocalHost {
                    name: spec.name.clone(),
                    ip: spec.ip,
                    interfaces: interfaces.get(&spec.name).cloned().unwrap_or_default(),
                };
                (spec.name.clone(), host)
            })
            .collect();
        log::info!("Realized {} hosts on the local platform", plan.hosts().count());
        Ok(Box::new(LocalNetwork { hosts, torn_down: false }))
    }
}

#[derive(Debug)]
pub struct LocalHost {
    name: String,
    ip: Ipv4Addr,
    interfaces: Vec<(String, Ipv4Addr)>,
}

impl VirtualHost for LocalHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    fn interface_ip(&self, switch: &str) -> Option<Ipv4Addr> {
        self.interfaces.iter().find(|(s, _)| s == switch).map(|(_, ip)| *ip)
    }

    fn spawn(&self, request: SpawnRequest) -> Result<Child, PlatformError> {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(request.stdout))
            .stderr(Stdio::from(request.stderr));
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }
        command.spawn().map_err(|source| PlatformError::Spawn {
            program: request.program.display().to_string(),
            source,
        })
    }
}

#[derive(Debug)]
pub struct LocalNetwork {
    hosts: BTreeMap<String, LocalHost>,
    torn_down: bool,
}

impl RealizedNetwork for LocalNetwork {
    fn host(&self, name: &str) -> Result<&dyn VirtualHost, PlatformError> {
        if self.torn_down {
            return Err(PlatformError::TornDown);
        }
        self.hosts
            .get(name)
            .map(|h| h as &dyn VirtualHost)
            .ok_or_else(|| PlatformError::UnknownHost(name.to_string()))
    }

    fn ping(&self, hosts: &[&str], _timeout: Duration) -> Result<PingReport, PlatformError> {
        for name in hosts {
            self.host(name)?;
        }
        let pairs = hosts.len() * hosts.len().saturating_sub(1);
        Ok(PingReport { sent: pairs, received: pairs })
    }

    fn teardown(&mut self) -> Result<(), PlatformError> {
        self.torn_down = true;
        Ok(())
    }
}
