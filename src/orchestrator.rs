//! Experiment orchestrator.
//!
//! This module drives one run from start to finish: build and check the
//! network plan, realize it on a platform, start the origin and edges, verify
//! connectivity, scale up the clients, and finally stop every process and tear
//! the network down. Shutdown and teardown happen on every path once the
//! network exists, including failures and operator interrupts.

use crate::cancel::CancellationToken;
use crate::config::{Api, ExperimentConfig, Mode, ServersConfig, ValidationError};
use crate::events::{EventSink, ExperimentEvent};
use crate::ip::AllocationError;
use crate::platform::{EmulationPlatform, PlatformError, RealizedNetwork};
use crate::process::{PhaseReport, ProcessError, ProcessLauncher, RunningProcesses, ShutdownSupervisor};
use crate::scale::{PlanClients, ScaleController, ScaleOutcome};
use crate::stats::InterfaceSampler;
use crate::topology::{build_plan, NetworkPlan};
use crate::utils::{validate_binary_spec, validate_plan, validate_server_command, BinaryError};
use color_eyre::eyre::WrapErr;
use log::{error, info, warn};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Period of the interface counter sampler
const INTERFACE_SAMPLE_PERIOD: Duration = Duration::from_secs(1);

/// Packet loss above which the network is considered unusable
const MAX_PACKET_LOSS: f64 = 99.0;

/// Stage of a run, used to say where a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Plan,
    Realize,
    ControlPlane,
    Connectivity,
    Shutdown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Realize => "realize",
            Phase::ControlPlane => "control-plane",
            Phase::Connectivity => "connectivity",
            Phase::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conditions that abort a run
#[derive(Debug, thiserror::Error)]
pub enum ExperimentError {
    #[error("network plan could not be allocated: {0}")]
    Allocation(#[from] AllocationError),

    #[error("network plan is inconsistent: {0}")]
    InvalidPlan(String),

    #[error("could not write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("network could not be realized: {0}")]
    Realize(#[source] PlatformError),

    #[error("origin failed to start: {0}")]
    Origin(#[source] ProcessError),

    #[error("connectivity check could not run: {0}")]
    Ping(#[source] PlatformError),

    #[error("no connectivity between servers ({loss:.1}% packet loss)")]
    NoConnectivity { loss: f64 },

    #[error("only {live} edges are running, {required} required")]
    InsufficientEdges { live: usize, required: usize },
}

impl ExperimentError {
    pub fn phase(&self) -> Phase {
        match self {
            ExperimentError::Allocation(_) | ExperimentError::InvalidPlan(_) | ExperimentError::Output { .. } => {
                Phase::Plan
            }
            ExperimentError::Realize(_) => Phase::Realize,
            ExperimentError::Origin(_) => Phase::ControlPlane,
            ExperimentError::Ping(_)
            | ExperimentError::NoConnectivity { .. }
            | ExperimentError::InsufficientEdges { .. } => Phase::Connectivity,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub active_clients: usize,
    pub failed_clients: usize,
    pub cancelled: bool,
    pub shutdown: Vec<PhaseReport>,
}

/// One experiment run and the state it carries
pub struct Experiment {
    config: ExperimentConfig,
    api: Api,
    mode: Mode,
    cancel: CancellationToken,
}

impl Experiment {
    pub fn new(config: ExperimentConfig) -> Result<Self, ValidationError> {
        config.validate()?;
        let api = config.api()?;
        let mode = config.mode()?;
        Ok(Self {
            config,
            api,
            mode,
            cancel: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Token that interrupts the run when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build and check the network plan for the configured number of clients
    pub fn plan(&self) -> Result<NetworkPlan, ExperimentError> {
        let params = self.config.topology_params();
        let plan = build_plan(&params, self.config.scale.target_clients())?;
        validate_plan(&plan).map_err(ExperimentError::InvalidPlan)?;
        Ok(plan)
    }

    /// Check the external programs and return the server settings with
    /// resolved binary paths
    pub fn resolve_programs(&self) -> Result<ServersConfig, BinaryError> {
        let mut servers = self.config.servers.clone();
        validate_server_command(&servers.origin.dir, &servers.origin.command)?;
        validate_server_command(&servers.edge.dir, &servers.edge.command)?;
        servers.client_binary = validate_binary_spec(&servers.client_binary.to_string_lossy())?;
        if self.config.general.stats {
            servers.sampler_binary = validate_binary_spec(&servers.sampler_binary.to_string_lossy())?;
        }
        Ok(servers)
    }

    /// Execute the run on `platform`
    pub fn run(&self, platform: &dyn EmulationPlatform) -> color_eyre::Result<RunSummary> {
        let log_dir = &self.config.general.log_dir;
        fs::create_dir_all(log_dir)
            .wrap_err_with(|| format!("Failed to create log directory '{}'", log_dir.display()))?;
        let servers = self
            .resolve_programs()
            .wrap_err("External programs are not available")?;
        let mut events = EventSink::create(log_dir).wrap_err("Failed to create the event log")?;

        info!(
            "Running api {} in mode {} with interval {:?} and size {} times {}",
            self.api, self.mode, self.config.scale.interval, self.config.scale.batch_size, self.config.scale.batches
        );

        // Nothing is running yet, so a plan failure needs no cleanup
        let plan = self.prepare(&mut events).map_err(|e| self.fail(e, &mut events))?;

        info!("Realizing the network on the {} platform", platform.name());
        let mut network = platform
            .realize(&plan)
            .map_err(|e| self.fail(ExperimentError::Realize(e), &mut events))?;

        let interface_sampler = if self.config.general.stats {
            match InterfaceSampler::spawn(log_dir, INTERFACE_SAMPLE_PERIOD) {
                Ok(sampler) => Some(sampler),
                Err(e) => {
                    warn!("Could not start interface statistics: {}", e);
                    None
                }
            }
        } else {
            None
        };

        let mut processes = RunningProcesses::new();
        let result = self.drive(&plan, network.as_ref(), &servers, &mut processes, &mut events);

        if let Some(sampler) = interface_sampler {
            let samples = sampler.stop();
            info!("Wrote {} interface statistics samples", samples);
        }
        info!("Stopping {} processes", processes.len());
        let shutdown = ShutdownSupervisor::from_config(&self.config.timeouts).stop(&mut processes, &mut events);
        if let Err(e) = network.teardown() {
            error!("Network teardown failed: {}", e);
            events.emit(ExperimentEvent::error(Phase::Shutdown.as_str(), "network", None, &e));
        }

        let outcome = result.map_err(|e| self.fail(e, &mut events))?;
        events.emit(ExperimentEvent::Summary {
            active_clients: outcome.active,
            failed_clients: outcome.failed,
            cancelled: outcome.cancelled,
        });
        Ok(RunSummary {
            active_clients: outcome.active,
            failed_clients: outcome.failed,
            cancelled: outcome.cancelled,
            shutdown,
        })
    }

    /// Build the plan and record it
    fn prepare(&self, events: &mut EventSink) -> Result<NetworkPlan, ExperimentError> {
        let plan = self.plan()?;
        let path = self.config.general.log_dir.join("topology.json");
        let json = serde_json::to_string_pretty(&plan).map_err(|e| ExperimentError::Output {
            path: path.clone(),
            source: e.into(),
        })?;
        fs::write(&path, json).map_err(|source| ExperimentError::Output { path, source })?;

        events.emit(ExperimentEvent::Topology {
            origin: plan.origin.ip.to_string(),
            edges: plan.num_edges(),
            clients: plan.num_clients(),
            links: plan.links.len(),
            seed: plan.seed,
        });
        Ok(plan)
    }

    /// Everything between a realized network and shutdown
    fn drive(
        &self,
        plan: &NetworkPlan,
        network: &dyn RealizedNetwork,
        servers: &ServersConfig,
        processes: &mut RunningProcesses,
        events: &mut EventSink,
    ) -> Result<ScaleOutcome, ExperimentError> {
        let timeouts = &self.config.timeouts;
        let log_dir = &self.config.general.log_dir;
        let launcher = ProcessLauncher::new(plan, network, servers, log_dir).with_stats(self.config.general.stats);

        info!("Starting origin and edge servers");
        launcher
            .start_control_plane(processes, events, timeouts.warmup, &self.cancel)
            .map_err(ExperimentError::Origin)?;
        if self.cancel.sleep(timeouts.settle) {
            warn!("Interrupted before scaling started");
            return Ok(ScaleOutcome {
                cancelled: true,
                ..ScaleOutcome::default()
            });
        }

        if !processes.origin_running() {
            warn!("Origin exited during start-up, see origin.err.log");
        }
        self.check_connectivity(plan, network, events)?;

        let live = processes.live_edges();
        let required = self.config.network.min_live_edges;
        if live.len() < required {
            return Err(ExperimentError::InsufficientEdges {
                live: live.len(),
                required,
            });
        }
        if live.len() < plan.num_edges() {
            warn!("Running with {} of {} edges: {:?}", live.len(), plan.num_edges(), live);
        }

        events.emit(ExperimentEvent::Update { active_clients: 0 });
        let controller = ScaleController::from_config(&self.config.scale);
        let mut clients = PlanClients::new(&launcher, processes, self.api, self.mode);
        Ok(controller.run(&mut clients, events, &self.cancel))
    }

    fn check_connectivity(
        &self,
        plan: &NetworkPlan,
        network: &dyn RealizedNetwork,
        events: &mut EventSink,
    ) -> Result<(), ExperimentError> {
        let timeout = self.config.timeouts.ping;
        let servers = plan.server_names();
        let report = network.ping(&servers, timeout).map_err(ExperimentError::Ping)?;
        let loss = report.loss_percent();
        events.emit(ExperimentEvent::Connectivity {
            hosts: servers.iter().map(|s| s.to_string()).collect(),
            packet_loss: loss,
        });
        if loss > MAX_PACKET_LOSS {
            return Err(ExperimentError::NoConnectivity { loss });
        }

        // Origin and the first two edges, kept in the log as a latency reference
        let probe: Vec<&str> = servers.iter().take(3).copied().collect();
        match network.ping(&probe, timeout) {
            Ok(report) => info!(
                "Ping among {}: {}/{} received",
                probe.join(", "),
                report.received,
                report.sent
            ),
            Err(e) => warn!("Ping among {} failed: {}", probe.join(", "), e),
        }
        Ok(())
    }

    /// Log and record a fatal error, then turn it into a report
    fn fail(&self, err: ExperimentError, events: &mut EventSink) -> color_eyre::Report {
        let phase = err.phase();
        error!("Experiment failed during {} phase: {}", phase, err);
        events.emit(ExperimentEvent::error(phase.as_str(), "experiment", None, &err));
        color_eyre::Report::new(err).wrap_err(format!("experiment failed during {}", phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformKind;

    fn config() -> ExperimentConfig {
        let mut config = ExperimentConfig::default();
        config.general.api = Some(Api::Flights);
        config.general.mode = Some(Mode::Ttl);
        config.network.total_cores = Some(32);
        config.scale.batch_size = 2;
        config.scale.batches = 3;
        config
    }

    #[test]
    fn test_requires_api_and_mode() {
        let mut config = config();
        config.general.mode = None;
        assert!(Experiment::new(config).is_err());
    }

    #[test]
    fn test_plan_sized_for_target() {
        let experiment = Experiment::new(config()).unwrap();
        let plan = experiment.plan().unwrap();
        assert_eq!(plan.num_clients(), 6);
        assert_eq!(plan.num_edges(), 5);
    }

    #[test]
    fn test_plan_failure_is_a_plan_phase_error() {
        let mut config = config();
        config.network.backbone = "10.0.0.0/30".parse().unwrap();
        let experiment = Experiment::new(config).unwrap();
        let err = experiment.plan().unwrap_err();
        assert!(matches!(err, ExperimentError::Allocation(_)));
        assert_eq!(err.phase(), Phase::Plan);
    }

    #[test]
    fn test_plan_on_a_small_machine() {
        let mut config = config();
        config.general.platform = PlatformKind::Local;
        config.network.total_cores = Some(8);
        let plan = Experiment::new(config).unwrap().plan().unwrap();
        assert_eq!(plan.num_clients(), 6);
        assert!(plan.hosts().all(|h| h.cores.cores().iter().all(|&c| c < 8)));
    }

    #[test]
    fn test_phases() {
        assert_eq!(ExperimentError::NoConnectivity { loss: 100.0 }.phase(), Phase::Connectivity);
        assert_eq!(
            ExperimentError::Origin(ProcessError::UnknownClient(0)).phase(),
            Phase::ControlPlane
        );
        assert_eq!(ExperimentError::Realize(PlatformError::TornDown).phase(), Phase::Realize);
        assert_eq!(Phase::ControlPlane.to_string(), "control-plane");
        let plan_errors = [
            ExperimentError::Allocation(AllocationError::NoEdges),
            ExperimentError::InvalidPlan("duplicate address".to_string()),
        ];
        assert!(plan_errors.iter().all(|e| e.phase() == Phase::Plan));
    }

    #[test]
    fn test_missing_client_binary() {
        let mut config = config();
        config.servers.client_binary = "/nonexistent/auto-client".into();
        let experiment = Experiment::new(config).unwrap();
        assert!(experiment.resolve_programs().is_err());
    }
}
