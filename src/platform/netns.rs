//! Linux network namespace platform.
//!
//! Every host becomes a network namespace, every switch a Linux bridge in the
//! root namespace, and every link a veth pair with the host end moved into the
//! namespace. Delayed links get a `netem` qdisc on both ends so each direction
//! carries the one-way delay once. Processes are started through
//! `ip netns exec <ns> taskset -c <cores> ...`, both of which exec the target,
//! so the returned child pid is the pid of the real process.
//!
//! Requires root and the `ip`, `tc` and `taskset` tools.

use super::{host_interfaces, EmulationPlatform, PingReport, PlatformError, RealizedNetwork, SpawnRequest, VirtualHost};
use crate::topology::{CoreSet, NetworkPlan};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Run an external command and fail on a non-zero exit status
fn run(program: &str, args: &[&str]) -> Result<(), PlatformError> {
    let command = format!("{} {}", program, args.join(" "));
    log::debug!("+ {}", command);
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|source| PlatformError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !output.status.success() {
        return Err(PlatformError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Builds networks out of namespaces; `prefix` keeps names of concurrent runs apart
#[derive(Debug, Clone)]
pub struct NetnsPlatform {
    prefix: String,
}

impl NetnsPlatform {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    fn namespace(&self, host: &str) -> String {
        format!("{}-{}", self.prefix, host)
    }

    fn bridge(&self, switch: &str) -> String {
        format!("{}-{}", self.prefix, switch)
    }
}

impl EmulationPlatform for NetnsPlatform {
    fn name(&self) -> &'static str {
        "netns"
    }

    fn realize(&self, plan: &NetworkPlan) -> Result<Box<dyn RealizedNetwork>, PlatformError> {
        let mut network = NetnsNetwork {
            hosts: BTreeMap::new(),
            bridges: Vec::new(),
            torn_down: false,
        };
        // On error the partially built network is dropped, which tears it down
        self.build_into(plan, &mut network)?;
        log::info!(
            "Realized {} namespaces, {} bridges, {} links",
            network.hosts.len(),
            network.bridges.len(),
            plan.links.len()
        );
        Ok(Box::new(network))
    }
}

impl NetnsPlatform {
    fn build_into(&self, plan: &NetworkPlan, network: &mut NetnsNetwork) -> Result<(), PlatformError> {
        let mut bridges = BTreeMap::new();
        for switch in &plan.switches {
            let bridge = self.bridge(&switch.name);
            run("ip", &["link", "add", "name", &bridge, "type", "bridge"])?;
            network.bridges.push(bridge.clone());
            run("ip", &["link", "set", &bridge, "up"])?;
            bridges.insert(switch.name.clone(), bridge);
        }

        let interfaces = host_interfaces(plan);
        for spec in plan.hosts() {
            let namespace = self.namespace(&spec.name);
            run("ip", &["netns", "add", &namespace])?;
            network.hosts.insert(
                spec.name.clone(),
                NetnsHost {
                    name: spec.name.clone(),
                    namespace: namespace.clone(),
                    ip: spec.ip,
                    cores: spec.cores.clone(),
                    interfaces: interfaces.get(&spec.name).cloned().unwrap_or_default(),
                },
            );
            run("ip", &["-n", &namespace, "link", "set", "lo", "up"])?;
        }

        let mut next_interface: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, link) in plan.links.iter().enumerate() {
            let namespace = self.namespace(&link.host);
            let bridge = bridges
                .get(&link.switch)
                .ok_or_else(|| PlatformError::UnknownHost(link.switch.clone()))?;
            let host_end = format!("{}{}h", self.prefix, index);
            let switch_end = format!("{}{}s", self.prefix, index);
            let slot = next_interface.entry(link.host.as_str()).or_insert(0);
            let interface = format!("eth{}", slot);
            *slot += 1;

            run("ip", &["link", "add", &host_end, "type", "veth", "peer", "name", &switch_end])?;
            run("ip", &["link", "set", &host_end, "netns", &namespace])?;
            run("ip", &["-n", &namespace, "link", "set", &host_end, "name", &interface])?;
            run("ip", &["-n", &namespace, "addr", "add", &link.cidr(), "dev", &interface])?;
            run("ip", &["-n", &namespace, "link", "set", &interface, "up"])?;
            run("ip", &["link", "set", &switch_end, "master", bridge])?;
            run("ip", &["link", "set", &switch_end, "up"])?;

            if let Some(delay) = link.delay {
                let delay = format!("{}us", delay.as_micros());
                run("tc", &["qdisc", "add", "dev", &switch_end, "root", "netem", "delay", &delay])?;
                run(
                    "ip",
                    &["netns", "exec", &namespace, "tc", "qdisc", "add", "dev", &interface, "root", "netem", "delay", &delay],
                )?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct NetnsHost {
    name: String,
    namespace: String,
    ip: Ipv4Addr,
    cores: CoreSet,
    interfaces: Vec<(String, Ipv4Addr)>,
}

impl NetnsHost {
    /// The command line that starts `program` pinned inside the namespace
    fn wrap(&self, program: &str) -> Vec<String> {
        vec![
            "netns".to_string(),
            "exec".to_string(),
            self.namespace.clone(),
            "taskset".to_string(),
            "-c".to_string(),
            self.cores.to_string(),
            program.to_string(),
        ]
    }
}

impl VirtualHost for NetnsHost {
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
        let program = request.program.display().to_string();
        let mut command = Command::new("ip");
        command
            .args(self.wrap(&program))
            .args(&request.args)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::from(request.stdout))
            .stderr(Stdio::from(request.stderr));
        if let Some(cwd) = &request.cwd {
            command.current_dir(cwd);
        }
        command
            .spawn()
            .map_err(|source| PlatformError::Spawn { program, source })
    }
}

#[derive(Debug)]
pub struct NetnsNetwork {
    hosts: BTreeMap<String, NetnsHost>,
    bridges: Vec<String>,
    torn_down: bool,
}

impl RealizedNetwork for NetnsNetwork {
    fn host(&self, name: &str) -> Result<&dyn VirtualHost, PlatformError> {
        if self.torn_down {
            return Err(PlatformError::TornDown);
        }
        self.hosts
            .get(name)
            .map(|h| h as &dyn VirtualHost)
            .ok_or_else(|| PlatformError::UnknownHost(name.to_string()))
    }

    fn ping(&self, hosts: &[&str], timeout: Duration) -> Result<PingReport, PlatformError> {
        let mut resolved = Vec::with_capacity(hosts.len());
        for name in hosts {
            let host = self
                .hosts
                .get(*name)
                .ok_or_else(|| PlatformError::UnknownHost(name.to_string()))?;
            resolved.push(host);
        }

        let wait = format!("{:.3}", timeout.as_secs_f64());
        let mut report = PingReport { sent: 0, received: 0 };
        for source in &resolved {
            for target in &resolved {
                if source.name == target.name {
                    continue;
                }
                let target_ip = target.ip.to_string();
                report.sent += 1;
                match run(
                    "ip",
                    &["netns", "exec", &source.namespace, "ping", "-c", "1", "-W", &wait, &target_ip],
                ) {
                    Ok(()) => {
                        report.received += 1;
                        log::debug!("{} -> {} ok", source.name, target.name);
                    }
                    Err(e) => log::debug!("{} -> {} lost: {}", source.name, target.name, e),
                }
            }
        }
        Ok(report)
    }

    fn teardown(&mut self) -> Result<(), PlatformError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        // Deleting a namespace removes its veth ends and with them the peers
        let mut first_error = None;
        for host in self.hosts.values() {
            if let Err(e) = run("ip", &["netns", "del", &host.namespace]) {
                log::warn!("Could not delete namespace {}: {}", host.namespace, e);
                first_error.get_or_insert(e);
            }
        }
        for bridge in &self.bridges {
            if let Err(e) = run("ip", &["link", "del", bridge]) {
                log::warn!("Could not delete bridge {}: {}", bridge, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for NetnsNetwork {
    fn drop(&mut self) {
        if !self.torn_down {
            if let Err(e) = self.teardown() {
                log::error!("Teardown of namespaces failed: {}", e);
            }
        }
    }
}
