//! Ordered shutdown.
//!
//! Clients are stopped first, then edges, then the origin. Within a phase every
//! process gets SIGINT before any of them is waited on, and all waits share one
//! deadline, so a phase never takes longer than its timeout no matter how many
//! processes ignore the signal. Processes still running at the deadline are
//! abandoned, not killed.

use super::types::{ManagedProcess, RunningProcesses, WaitOutcome};
use crate::config::TimeoutConfig;
use crate::events::{EventSink, ExperimentEvent};
use crate::topology::HostRole;
use log::{error, info, warn};
use std::mem;
use std::time::{Duration, Instant};

/// What happened to the processes of one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub role: HostRole,
    pub signaled: usize,
    pub exited: usize,
    pub timed_out: usize,
}

#[derive(Debug, Clone)]
pub struct ShutdownSupervisor {
    timeout: Duration,
    /// `None` waits for the origin without limit
    origin_timeout: Option<Duration>,
}

impl ShutdownSupervisor {
    pub fn new(timeout: Duration, origin_timeout: Option<Duration>) -> Self {
        Self { timeout, origin_timeout }
    }

    pub fn from_config(timeouts: &TimeoutConfig) -> Self {
        Self::new(timeouts.shutdown, timeouts.origin_shutdown)
    }

    /// Drain and stop every process in `processes`
    pub fn stop(&self, processes: &mut RunningProcesses, events: &mut EventSink) -> Vec<PhaseReport> {
        let phases = [
            (HostRole::Client, mem::take(&mut processes.clients), Some(self.timeout)),
            (HostRole::Edge, mem::take(&mut processes.edges), Some(self.timeout)),
            (HostRole::Origin, mem::take(&mut processes.origin), self.origin_timeout),
        ];

        let mut reports = Vec::with_capacity(phases.len());
        for (role, group, timeout) in phases {
            let report = stop_phase(role, group, timeout);
            events.emit(ExperimentEvent::Shutdown {
                role: role.as_str().to_string(),
                signaled: report.signaled,
                exited: report.exited,
                timed_out: report.timed_out,
            });
            reports.push(report);
        }
        reports
    }
}

fn stop_phase(role: HostRole, mut group: Vec<ManagedProcess>, timeout: Option<Duration>) -> PhaseReport {
    let mut report = PhaseReport {
        role,
        signaled: 0,
        exited: 0,
        timed_out: 0,
    };
    if group.is_empty() {
        return report;
    }
    info!("Stopping {} {} processes", group.len(), role);

    for process in group.iter_mut() {
        match process.interrupt() {
            Ok(true) => report.signaled += 1,
            Ok(false) => {}
            Err(e) => warn!("Could not signal {} (pid {}): {}", process.label, process.pid(), e),
        }
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    for process in group.iter_mut() {
        match process.wait_until(deadline) {
            Ok(WaitOutcome::Exited(status)) => {
                report.exited += 1;
                log::debug!("{} {} exited with {}", process.kind.as_str(), process.label, status);
            }
            Ok(WaitOutcome::TimedOut) => {
                report.timed_out += 1;
                error!("Timeout while waiting for {} (pid {})", process.label, process.pid());
            }
            Err(e) => {
                report.timed_out += 1;
                error!("Could not wait for {} (pid {}): {}", process.label, process.pid(), e);
            }
        }
    }
    report
}
