//! Scale-up loop.
//!
//! Adds clients to the running network in fixed-size batches with a fixed pause
//! in between until the target count is reached. A client that fails to start
//! still takes its slot; it is counted as failed and never retried.

use crate::cancel::CancellationToken;
use crate::config::{Api, Mode, ScaleConfig};
use crate::events::{EventSink, ExperimentEvent};
use crate::process::{ClientStart, ProcessError, ProcessLauncher, RunningProcesses};
use log::{error, info};
use std::time::Duration;

/// Something that can start client `index`
pub trait ClientLauncher {
    fn start_client(&mut self, index: usize, events: &mut EventSink) -> Result<ClientStart, ProcessError>;
}

/// [`ClientLauncher`] backed by a [`ProcessLauncher`] and the run's process set
pub struct PlanClients<'a, 'p> {
    launcher: &'a ProcessLauncher<'p>,
    processes: &'a mut RunningProcesses,
    api: Api,
    mode: Mode,
}

impl<'a, 'p> PlanClients<'a, 'p> {
    pub fn new(launcher: &'a ProcessLauncher<'p>, processes: &'a mut RunningProcesses, api: Api, mode: Mode) -> Self {
        Self {
            launcher,
            processes,
            api,
            mode,
        }
    }
}

impl ClientLauncher for PlanClients<'_, '_> {
    fn start_client(&mut self, index: usize, events: &mut EventSink) -> Result<ClientStart, ProcessError> {
        self.launcher
            .start_client(self.processes, events, index, self.api, self.mode)
    }
}

/// Where the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScaleOutcome {
    /// Slots used, including failed starts
    pub active: usize,
    pub failed: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct ScaleController {
    target: usize,
    batch_size: usize,
    interval: Duration,
}

impl ScaleController {
    pub fn new(target: usize, batch_size: usize, interval: Duration) -> Self {
        Self {
            target,
            batch_size: batch_size.max(1),
            interval,
        }
    }

    pub fn from_config(scale: &ScaleConfig) -> Self {
        Self::new(scale.target_clients(), scale.batch_size, scale.interval)
    }

    pub fn target(&self) -> usize {
        self.target
    }

    /// Run until the target is reached or `cancel` fires.
    ///
    /// Emits `ClientStarted` or `Error` per client and `Update` after each
    /// batch. The pause after a batch wakes up as soon as `cancel` fires.
    pub fn run(
        &self,
        launcher: &mut dyn ClientLauncher,
        events: &mut EventSink,
        cancel: &CancellationToken,
    ) -> ScaleOutcome {
        let mut outcome = ScaleOutcome::default();

        while outcome.active < self.target {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let batch = self.batch_size.min(self.target - outcome.active);
            info!("Scaling up clients from {} to {}", outcome.active, outcome.active + batch);

            for _ in 0..batch {
                if cancel.is_cancelled() {
                    outcome.cancelled = true;
                    break;
                }
                let index = outcome.active;
                match launcher.start_client(index, events) {
                    Ok(start) => events.emit(ExperimentEvent::ClientStarted {
                        client: start.client,
                        edge: start.edge,
                        edge_server: start.edge_server.to_string(),
                        pid: start.pid,
                    }),
                    Err(e) => {
                        error!("Client {} failed to start: {}", index, e);
                        events.emit(ExperimentEvent::error("scale", "client", Some(index), &e));
                        outcome.failed += 1;
                    }
                }
                outcome.active += 1;
            }

            events.emit(ExperimentEvent::Update {
                active_clients: outcome.active,
            });
            if outcome.cancelled || cancel.sleep(self.interval) {
                outcome.cancelled = true;
                break;
            }
        }

        info!(
            "Scale loop finished with {} clients ({} failed){}",
            outcome.active,
            outcome.failed,
            if outcome.cancelled { ", interrupted" } else { "" }
        );
        outcome
    }
}
