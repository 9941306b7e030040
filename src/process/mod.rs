//! Process supervision module.
//!
//! Starts the origin, edge, client and sampler processes inside their virtual
//! hosts and stops them again in dependency order.

pub mod env;
pub mod launcher;
pub mod sampler;
pub mod shutdown;
pub mod types;

// Re-export commonly used items for convenience
pub use env::{EdgeEnv, EnvKey, OriginEnv};
pub use launcher::{ClientStart, ProcessLauncher};
pub use sampler::attach_sampler;
pub use shutdown::{PhaseReport, ShutdownSupervisor};
pub use types::{ManagedProcess, ProcessError, ProcessKind, RunningProcesses, WaitOutcome};

use std::fs::File;
use std::path::Path;

/// Create (truncate) a log file a child process writes to
pub(crate) fn open_log(path: &Path) -> Result<File, ProcessError> {
    File::create(path).map_err(|source| ProcessError::LogFile {
        path: path.to_path_buf(),
        source,
    })
}
