//! Starting servers and clients inside their virtual hosts.
//!
//! Every process writes its stdout and stderr to `<label>.log` and
//! `<label>.err.log` in the log directory. Labels are `origin`,
//! `edge_server_<i>` and `client_<n>`.

use super::env::{EdgeEnv, OriginEnv};
use super::open_log;
use super::sampler::{attach_sampler, sampler_label};
use super::types::{ManagedProcess, ProcessError, ProcessKind, RunningProcesses};
use crate::cancel::CancellationToken;
use crate::config::{Api, Mode, ServerCommand, ServersConfig};
use crate::events::{EventSink, ExperimentEvent};
use crate::platform::{RealizedNetwork, SpawnRequest, VirtualHost};
use crate::topology::{EdgeSpec, HostRole, NetworkPlan};
use log::{error, info, warn};
use std::net::SocketAddrV4;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Duration;

/// A client that was started, and where it was pointed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStart {
    pub client: usize,
    pub edge: usize,
    pub edge_server: SocketAddrV4,
    pub pid: u32,
}

pub struct ProcessLauncher<'a> {
    plan: &'a NetworkPlan,
    network: &'a dyn RealizedNetwork,
    servers: &'a ServersConfig,
    log_dir: &'a Path,
    stats: bool,
}

impl<'a> ProcessLauncher<'a> {
    pub fn new(
        plan: &'a NetworkPlan,
        network: &'a dyn RealizedNetwork,
        servers: &'a ServersConfig,
        log_dir: &'a Path,
    ) -> Self {
        Self {
            plan,
            network,
            servers,
            log_dir,
            stats: false,
        }
    }

    /// Attach a resource sampler to every started process
    pub fn with_stats(mut self, stats: bool) -> Self {
        self.stats = stats;
        self
    }

    fn host(&self, name: &str, label: &str) -> Result<&'a dyn VirtualHost, ProcessError> {
        self.network.host(name).map_err(|source| ProcessError::Spawn {
            label: label.to_string(),
            source,
        })
    }

    fn spawn_logged(
        &self,
        host: &dyn VirtualHost,
        label: &str,
        program: PathBuf,
        args: Vec<String>,
        env: Vec<(String, String)>,
        cwd: Option<PathBuf>,
    ) -> Result<Child, ProcessError> {
        let stdout = open_log(&self.log_dir.join(format!("{}.log", label)))?;
        let stderr = open_log(&self.log_dir.join(format!("{}.err.log", label)))?;
        host.spawn(SpawnRequest {
            program,
            args,
            env,
            cwd,
            stdout,
            stderr,
        })
        .map_err(|source| ProcessError::Spawn {
            label: label.to_string(),
            source,
        })
    }

    /// Program path and working directory of a server.
    ///
    /// The program is made absolute so it does not depend on how the platform
    /// combines a relative path with the working directory.
    fn server_program(command: &ServerCommand) -> Result<(PathBuf, PathBuf), ProcessError> {
        let dir = std::path::absolute(&command.dir).map_err(|source| ProcessError::WorkingDir {
            path: command.dir.clone(),
            source,
        })?;
        let program = if command.command.is_absolute() {
            command.command.clone()
        } else {
            dir.join(&command.command)
        };
        Ok((program, dir))
    }

    fn origin_address(&self) -> Result<SocketAddrV4, ProcessError> {
        let origin = self.host(&self.plan.origin.name, "origin")?;
        Ok(SocketAddrV4::new(origin.ip(), self.servers.origin.port))
    }

    /// Backbone `ip:port` of every edge, in index order
    fn edge_servers(&self) -> Result<Vec<SocketAddrV4>, ProcessError> {
        self.plan
            .edges
            .iter()
            .map(|edge| {
                let host = self.host(&edge.host.name, &edge_label(edge.index))?;
                Ok(SocketAddrV4::new(host.ip(), self.servers.edge.port))
            })
            .collect()
    }

    fn start_origin(&self) -> Result<ManagedProcess, ProcessError> {
        let host = self.host(&self.plan.origin.name, "origin")?;
        let env = OriginEnv::new(self.servers.origin.port)?;
        let (program, cwd) = Self::server_program(&self.servers.origin)?;
        let child = self.spawn_logged(host, "origin", program, Vec::new(), env.to_env(), Some(cwd))?;
        Ok(ManagedProcess::new("origin", HostRole::Origin, ProcessKind::Server, 0, child))
    }

    fn start_edge(
        &self,
        edge: &EdgeSpec,
        edge_servers: &[SocketAddrV4],
        origin: SocketAddrV4,
    ) -> Result<ManagedProcess, ProcessError> {
        let label = edge_label(edge.index);
        let host = self.host(&edge.host.name, &label)?;
        let env = EdgeEnv::new(
            host.ip(),
            self.servers.edge.port,
            edge_servers.to_vec(),
            origin,
            self.servers.redis_port,
        )?;
        let (program, cwd) = Self::server_program(&self.servers.edge)?;
        let child = self.spawn_logged(host, &label, program, Vec::new(), env.to_env(), Some(cwd))?;
        Ok(ManagedProcess::new(label, HostRole::Edge, ProcessKind::Server, edge.index, child))
    }

    /// Start a sampler for a freshly started process. Failures are only reported.
    fn sample(
        &self,
        processes: &mut RunningProcesses,
        events: &mut EventSink,
        host_name: &str,
        target: (&str, u32),
        role: HostRole,
        instance: usize,
    ) {
        if !self.stats {
            return;
        }
        let (label, pid) = target;
        events.emit(ExperimentEvent::Stats {
            file: sampler_label(label),
            pid,
        });
        let index = if role == HostRole::Origin { None } else { Some(instance) };
        let sampler = self
            .host(host_name, label)
            .and_then(|host| attach_sampler(host, &self.servers.sampler_binary, pid, self.log_dir, label, role, instance));
        match sampler {
            Ok(sampler) => processes.push(sampler),
            Err(e) => {
                warn!("Could not sample {}: {}", label, e);
                events.emit(ExperimentEvent::error("stats", role.as_str(), index, &e));
            }
        }
    }

    /// Start the origin, wait for it to warm up, then start every edge.
    ///
    /// Only an origin failure is returned; a failed edge is reported as an
    /// `Error` event and left out of `processes`. A cancelled warm-up returns
    /// early with just the origin running.
    pub fn start_control_plane(
        &self,
        processes: &mut RunningProcesses,
        events: &mut EventSink,
        warmup: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), ProcessError> {
        let origin = self.start_origin()?;
        let origin_pid = origin.pid();
        info!("Started origin on {} (pid {})", self.plan.origin.ip, origin_pid);
        processes.push(origin);

        if cancel.sleep(warmup) {
            warn!("Interrupted while the origin was warming up");
            return Ok(());
        }

        let origin_address = self.origin_address()?;
        let edge_servers = self.edge_servers()?;
        for edge in &self.plan.edges {
            match self.start_edge(edge, &edge_servers, origin_address) {
                Ok(process) => {
                    let pid = process.pid();
                    let label = process.label.clone();
                    info!("Started {} on {} (pid {})", label, edge.host.ip, pid);
                    processes.push(process);
                    self.sample(processes, events, &edge.host.name, (&label, pid), HostRole::Edge, edge.index);
                }
                Err(e) => {
                    error!("Edge {} failed to start: {}", edge.index, e);
                    events.emit(ExperimentEvent::error(
                        "control-plane",
                        HostRole::Edge.as_str(),
                        Some(edge.index),
                        &e,
                    ));
                }
            }
        }

        let origin_name = self.plan.origin.name.clone();
        self.sample(processes, events, &origin_name, ("origin", origin_pid), HostRole::Origin, 0);
        Ok(())
    }

    /// Start client `index` against its assigned edge.
    ///
    /// Fails if the client was already started or its edge is not running.
    pub fn start_client(
        &self,
        processes: &mut RunningProcesses,
        events: &mut EventSink,
        index: usize,
        api: Api,
        mode: Mode,
    ) -> Result<ClientStart, ProcessError> {
        if processes.client_started(index) {
            return Err(ProcessError::AlreadyStarted(index));
        }
        let client = self.plan.client(index).ok_or(ProcessError::UnknownClient(index))?;
        let edge = self
            .plan
            .edge_for_client(index)
            .ok_or(ProcessError::UnknownClient(index))?;
        if !processes.live_edges().contains(&edge.index) {
            return Err(ProcessError::EdgeUnavailable {
                client: index,
                edge: edge.index,
            });
        }

        let label = client_label(index);
        let edge_host = self.host(&edge.host.name, &label)?;
        let edge_ip = edge_host
            .interface_ip(&edge.client_switch)
            .ok_or_else(|| ProcessError::MissingInterface {
                host: edge.host.name.clone(),
                switch: edge.client_switch.clone(),
            })?;
        let edge_server = SocketAddrV4::new(edge_ip, self.servers.edge.port);

        let host = self.host(&client.host.name, &label)?;
        let args = vec![
            "--api".to_string(),
            api.as_str().to_string(),
            "--mode".to_string(),
            mode.as_str().to_string(),
            "--edge-server".to_string(),
            edge_server.to_string(),
            "--client-number".to_string(),
            index.to_string(),
        ];
        let child = self.spawn_logged(host, &label, self.servers.client_binary.clone(), args, Vec::new(), None)?;
        let process = ManagedProcess::new(label.clone(), HostRole::Client, ProcessKind::Client, index, child);
        let pid = process.pid();
        processes.push(process);
        self.sample(processes, events, &client.host.name, (&label, pid), HostRole::Client, index);

        Ok(ClientStart {
            client: index,
            edge: edge.index,
            edge_server,
            pid,
        })
    }
}

pub fn edge_label(index: usize) -> String {
    format!("edge_server_{}", index)
}

pub fn client_label(index: usize) -> String {
    format!("client_{}", index)
}
