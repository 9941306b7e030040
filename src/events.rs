//! Experiment events.
//!
//! Events are newline-delimited JSON records of the shape
//! `{"type": ..., ...fields, "time": <ns since epoch>}`. They are written to
//! `events.log` in the log directory and mirrored through the logger; nothing
//! in this crate reads them back.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Counters of one network interface, as read from `/proc/net/dev`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub errin: u64,
    pub errout: u64,
    pub dropin: u64,
    pub dropout: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ExperimentEvent {
    Topology {
        origin: String,
        edges: usize,
        clients: usize,
        links: usize,
        seed: u64,
    },
    Update {
        active_clients: usize,
    },
    ClientStarted {
        client: usize,
        edge: usize,
        edge_server: String,
        pid: u32,
    },
    Stats {
        file: String,
        pid: u32,
    },
    Connectivity {
        hosts: Vec<String>,
        packet_loss: f64,
    },
    Error {
        phase: String,
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        message: String,
    },
    Shutdown {
        role: String,
        signaled: usize,
        exited: usize,
        timed_out: usize,
    },
    Interfaces {
        stats: BTreeMap<String, InterfaceCounters>,
    },
    Summary {
        active_clients: usize,
        failed_clients: usize,
        cancelled: bool,
    },
}

impl ExperimentEvent {
    pub fn error(phase: &str, role: &str, index: Option<usize>, message: impl ToString) -> Self {
        ExperimentEvent::Error {
            phase: phase.to_string(),
            role: role.to_string(),
            index,
            message: message.to_string(),
        }
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    #[serde(flatten)]
    event: &'a ExperimentEvent,
    time: i64,
}

/// Nanoseconds since the Unix epoch
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Serialize an event stamped with the current time, without a trailing newline
pub fn to_line(event: &ExperimentEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(&EventRecord {
        event,
        time: now_nanos(),
    })
}

/// Write-only sink for [`ExperimentEvent`]s
pub struct EventSink {
    writer: Option<Box<dyn Write + Send>>,
    mirror_to_log: bool,
    emitted: usize,
}

impl EventSink {
    /// Append events to `<log_dir>/events.log` and mirror them to the logger
    pub fn create(log_dir: &Path) -> std::io::Result<Self> {
        let file = File::create(log_dir.join("events.log"))?;
        Ok(Self {
            writer: Some(Box::new(BufWriter::new(file))),
            mirror_to_log: true,
            emitted: 0,
        })
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Some(writer),
            mirror_to_log: false,
            emitted: 0,
        }
    }

    /// Only log, no file
    pub fn log_only() -> Self {
        Self {
            writer: None,
            mirror_to_log: true,
            emitted: 0,
        }
    }

    /// Number of events emitted so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    pub fn emit(&mut self, event: ExperimentEvent) {
        let line = match to_line(&event) {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Could not serialize event {:?}: {}", event, e);
                return;
            }
        };
        if self.mirror_to_log {
            log::info!("{}", line);
        }
        if let Some(writer) = self.writer.as_mut() {
            let written = writeln!(writer, "{}", line).and_then(|_| writer.flush());
            if let Err(e) = written {
                log::warn!("Could not write event: {}", e);
            }
        }
        self.emitted += 1;
    }
}
