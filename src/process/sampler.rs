//! Resource samplers.
//!
//! A sampler is an external program (psrecord by default) started in the same
//! host as the process it watches. It records CPU, memory and I/O of the pid
//! and its children once per second as CSV.

use super::types::{ManagedProcess, ProcessError, ProcessKind};
use super::open_log;
use crate::platform::{SpawnRequest, VirtualHost};
use crate::topology::HostRole;
use std::path::Path;

/// Label of the sampler watching the process labelled `label`
pub fn sampler_label(label: &str) -> String {
    format!("{}_stats", label)
}

/// Arguments passed to the sampler program
pub fn sampler_args(pid: u32, log_path: &Path) -> Vec<String> {
    vec![
        pid.to_string(),
        "--log".to_string(),
        log_path.display().to_string(),
        "--interval".to_string(),
        "1".to_string(),
        "--log-format".to_string(),
        "csv".to_string(),
        "--include-children".to_string(),
        "--include-io".to_string(),
    ]
}

/// Start a sampler for `pid` inside `host`.
///
/// Samples go to `<label>_stats.log`; the sampler's own output goes to
/// `<label>_stats.err.log`.
pub fn attach_sampler(
    host: &dyn VirtualHost,
    program: &Path,
    pid: u32,
    log_dir: &Path,
    label: &str,
    role: HostRole,
    instance: usize,
) -> Result<ManagedProcess, ProcessError> {
    let stem = sampler_label(label);
    // The sampler may run with another working directory
    let log_dir = log_dir.canonicalize().map_err(|source| ProcessError::LogFile {
        path: log_dir.to_path_buf(),
        source,
    })?;
    let samples = log_dir.join(format!("{}.log", stem));
    let stdout = open_log(&log_dir.join(format!("{}.err.log", stem)))?;
    let stderr = stdout.try_clone().map_err(|source| ProcessError::LogFile {
        path: log_dir.join(format!("{}.err.log", stem)),
        source,
    })?;

    let child = host
        .spawn(SpawnRequest {
            program: program.to_path_buf(),
            args: sampler_args(pid, &samples),
            env: Vec::new(),
            cwd: None,
            stdout,
            stderr,
        })
        .map_err(|source| ProcessError::Spawn {
            label: stem.clone(),
            source,
        })?;
    log::debug!("Sampler {} watching pid {} (pid {})", stem, pid, child.id());
    Ok(ManagedProcess::new(stem, role, ProcessKind::Sampler, instance, child))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{EmulationPlatform, LocalPlatform};
    use crate::topology::{build_plan, TopologyParams};
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_sampler_args() {
        let args = sampler_args(42, Path::new("/tmp/logs/origin_stats.log"));
        assert_eq!(
            args.join(" "),
            "42 --log /tmp/logs/origin_stats.log --interval 1 --log-format csv --include-children --include-io"
        );
    }

    #[test]
    fn test_attach_sampler_with_fake_program() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("fake-psrecord");
        fs::write(&program, "#!/bin/sh\necho \"$@\"\n").unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

        let params = TopologyParams { total_cores: 32, ..TopologyParams::default() };
        let plan = build_plan(&params, 0).unwrap();
        let network = LocalPlatform::new().realize(&plan).unwrap();
        let host = network.host("origin").unwrap();

        let mut sampler = attach_sampler(host, &program, 1234, dir.path(), "origin", HostRole::Origin, 0).unwrap();
        assert_eq!(sampler.label, "origin_stats");
        assert_eq!(sampler.kind, ProcessKind::Sampler);
        sampler.wait_until(None).unwrap();

        let output = fs::read_to_string(dir.path().join("origin_stats.err.log")).unwrap();
        assert!(output.starts_with("1234 --log /"));
        assert!(output.contains("origin_stats.log --interval 1"));
    }

    #[test]
    fn test_missing_sampler_fails() {
        let dir = tempfile::tempdir().unwrap();
        let params = TopologyParams { total_cores: 32, ..TopologyParams::default() };
        let plan = build_plan(&params, 0).unwrap();
        let network = LocalPlatform::new().realize(&plan).unwrap();
        let host = network.host("e1").unwrap();

        let result = attach_sampler(
            host,
            &dir.path().join("no-such-sampler"),
            1,
            dir.path(),
            "edge_server_0",
            HostRole::Edge,
            0,
        );
        assert!(matches!(result, Err(ProcessError::Spawn { .. })));
    }
}
