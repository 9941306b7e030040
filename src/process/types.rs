//! Process type definitions.
//!
//! Handles to the OS processes started during a run and the set that owns
//! them until shutdown.

use crate::platform::PlatformError;
use crate::topology::HostRole;
use std::io;
use std::path::PathBuf;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between `try_wait` polls while waiting for an exit
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors raised while starting processes
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("could not open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not resolve working directory {path}: {source}")]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not start {label}: {source}")]
    Spawn {
        label: String,
        #[source]
        source: PlatformError,
    },

    #[error("invalid environment for {role}: {reason}")]
    InvalidEnvironment { role: HostRole, reason: String },

    #[error("client {0} is not part of the network plan")]
    UnknownClient(usize),

    #[error("client {0} was already started")]
    AlreadyStarted(usize),

    #[error("edge {edge} assigned to client {client} is not running")]
    EdgeUnavailable { client: usize, edge: usize },

    #[error("host {host} has no interface on {switch}")]
    MissingInterface { host: String, switch: String },
}

/// What a managed process does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessKind {
    /// Origin or edge server
    Server,
    /// Load-generating client
    Client,
    /// Resource sampler attached to another process
    Sampler,
}

impl ProcessKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessKind::Server => "server",
            ProcessKind::Client => "client",
            ProcessKind::Sampler => "sampler",
        }
    }
}

/// Result of waiting on a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
}

/// A started process and its identity in the run
#[derive(Debug)]
pub struct ManagedProcess {
    /// Log stem, e.g. `origin`, `edge_server_2`, `client_7`, `client_7_stats`
    pub label: String,
    pub role: HostRole,
    pub kind: ProcessKind,
    /// Edge or client index; 0 for the origin
    pub instance: usize,
    child: Child,
    signaled: bool,
    exit: Option<ExitStatus>,
}

impl ManagedProcess {
    pub fn new(label: impl Into<String>, role: HostRole, kind: ProcessKind, instance: usize, child: Child) -> Self {
        Self {
            label: label.into(),
            role,
            kind,
            instance,
            child,
            signaled: false,
            exit: None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn signaled(&self) -> bool {
        self.signaled
    }

    /// Whether the process has not exited yet. Reaps it if it has.
    pub fn is_running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status);
                false
            }
            Ok(None) => true,
            Err(e) => {
                log::warn!("Could not query {} (pid {}): {}", self.label, self.pid(), e);
                false
            }
        }
    }

    /// Send SIGINT once. Processes that already exited are not signaled.
    pub fn interrupt(&mut self) -> io::Result<bool> {
        if self.signaled || !self.is_running() {
            return Ok(false);
        }
        self.signaled = true;
        let pid = self.pid() as libc::pid_t;
        // SAFETY: kill(2) has no memory-safety preconditions
        let ret = unsafe { libc::kill(pid, libc::SIGINT) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(true)
    }

    /// Wait for the exit until `deadline`, or forever when it is `None`
    pub fn wait_until(&mut self, deadline: Option<Instant>) -> io::Result<WaitOutcome> {
        if let Some(status) = self.exit {
            return Ok(WaitOutcome::Exited(status));
        }
        let Some(deadline) = deadline else {
            let status = self.child.wait()?;
            self.exit = Some(status);
            return Ok(WaitOutcome::Exited(status));
        };
        loop {
            if let Some(status) = self.child.try_wait()? {
                self.exit = Some(status);
                return Ok(WaitOutcome::Exited(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitOutcome::TimedOut);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}

/// Every process started during a run, grouped by role.
///
/// Appended to while starting, drained by the shutdown supervisor. Samplers
/// live in the list of the role they watch.
#[derive(Debug, Default)]
pub struct RunningProcesses {
    pub origin: Vec<ManagedProcess>,
    pub edges: Vec<ManagedProcess>,
    pub clients: Vec<ManagedProcess>,
    started_clients: Vec<usize>,
}

impl RunningProcesses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, process: ManagedProcess) {
        if process.role == HostRole::Client && process.kind == ProcessKind::Client {
            self.started_clients.push(process.instance);
        }
        match process.role {
            HostRole::Origin => self.origin.push(process),
            HostRole::Edge => self.edges.push(process),
            HostRole::Client => self.clients.push(process),
        }
    }

    pub fn client_started(&self, index: usize) -> bool {
        self.started_clients.contains(&index)
    }

    /// Indices of edges whose server process is still running
    pub fn live_edges(&mut self) -> Vec<usize> {
        let mut live: Vec<usize> = self
            .edges
            .iter_mut()
            .filter(|p| p.kind == ProcessKind::Server)
            .filter_map(|p| if p.is_running() { Some(p.instance) } else { None })
            .collect();
        live.sort_unstable();
        live
    }

    pub fn origin_running(&mut self) -> bool {
        self.origin
            .iter_mut()
            .any(|p| p.kind == ProcessKind::Server && p.is_running())
    }

    pub fn len(&self) -> usize {
        self.origin.len() + self.edges.len() + self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
