//! Binary path resolution and validation utilities.
//!
//! This module resolves the programs the orchestrator starts (client binary,
//! server entry points, resource sampler) and checks that they exist and are
//! executable before any network is built.

use std::env;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Errors that can occur during binary resolution or validation
#[derive(Debug, thiserror::Error)]
pub enum BinaryError {
    #[error("Binary not found: {path}")]
    NotFound { path: String },

    #[error("Binary is not executable: {path}")]
    NotExecutable { path: String },

    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("Cannot determine home directory")]
    NoHomeDir,
}

/// Get the user's home directory from the HOME environment variable
fn get_home_dir() -> Result<PathBuf, BinaryError> {
    env::var("HOME")
        .map(PathBuf::from)
        .map_err(|_| BinaryError::NoHomeDir)
}

/// Resolve a binary from a bare name or a path.
///
/// Resolution rules:
/// 1. If the name starts with `~/`: expand to the home directory
/// 2. If it contains `/`: use it as given (relative to the working directory)
/// 3. Otherwise: search `PATH`
///
/// ```ignore
/// resolve_binary_path("psrecord") -> /usr/local/bin/psrecord
/// resolve_binary_path("auto-client/main.py") -> auto-client/main.py
/// resolve_binary_path("~/bin/client") -> /home/user/bin/client
/// ```
pub fn resolve_binary_path(name_or_path: &str) -> Result<PathBuf, BinaryError> {
    if let Some(rest) = name_or_path.strip_prefix("~/") {
        return Ok(get_home_dir()?.join(rest));
    }
    if name_or_path.contains('/') {
        return Ok(PathBuf::from(name_or_path));
    }

    let search_path = env::var_os("PATH").unwrap_or_default();
    env::split_paths(&search_path)
        .map(|dir| dir.join(name_or_path))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| BinaryError::NotFound {
            path: name_or_path.to_string(),
        })
}

/// Validate that a binary exists and is executable.
///
/// This should be called at startup before building the network to catch
/// configuration errors early.
pub fn validate_binary(path: &Path) -> Result<(), BinaryError> {
    let metadata = path.metadata().map_err(|_| BinaryError::NotFound {
        path: path.display().to_string(),
    })?;

    // Check if file is executable (any execute bit set)
    if !metadata.is_file() || metadata.permissions().mode() & 0o111 == 0 {
        return Err(BinaryError::NotExecutable {
            path: path.display().to_string(),
        });
    }

    Ok(())
}

/// Resolve and validate a binary in one step
pub fn validate_binary_spec(name_or_path: &str) -> Result<PathBuf, BinaryError> {
    let resolved = resolve_binary_path(name_or_path)?;
    validate_binary(&resolved)?;
    Ok(resolved)
}

/// Validate a server entry point: `dir` must exist and `command` must be
/// executable, resolved against `dir` when relative.
pub fn validate_server_command(dir: &Path, command: &Path) -> Result<(), BinaryError> {
    if !dir.is_dir() {
        return Err(BinaryError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }
    if command.is_absolute() {
        validate_binary(command)
    } else {
        validate_binary(&dir.join(command))
    }
}
