use crate::config::{Api, ExperimentConfig, Mode, PlatformKind};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Load and parse configuration from a YAML file
///
/// The file is not validated here: command-line overrides may still fill in
/// required values, so call [`ExperimentConfig::validate`] after
/// [`apply_cli_overrides`].
pub fn load_config(config_path: &Path) -> Result<ExperimentConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;

    let config: ExperimentConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    Ok(config)
}

/// CLI arguments that override YAML settings
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api: Option<Api>,
    pub mode: Option<Mode>,
    pub scale_interval: Option<Duration>,
    pub scale_size: Option<usize>,
    pub scale_times: Option<usize>,
    pub log_dir: Option<PathBuf>,
    pub stats: Option<bool>,
    pub seed: Option<u64>,
    pub platform: Option<PlatformKind>,
}

/// Apply CLI overrides to a configuration and validate the result
pub fn apply_cli_overrides(config: &mut ExperimentConfig, overrides: &CliOverrides) -> Result<()> {
    if let Some(api) = overrides.api {
        config.general.api = Some(api);
    }
    if let Some(mode) = overrides.mode {
        config.general.mode = Some(mode);
    }
    if let Some(interval) = overrides.scale_interval {
        config.scale.interval = interval;
    }
    if let Some(size) = overrides.scale_size {
        config.scale.batch_size = size;
    }
    if let Some(times) = overrides.scale_times {
        config.scale.batches = times;
    }
    if let Some(log_dir) = &overrides.log_dir {
        config.general.log_dir = log_dir.clone();
    }
    if let Some(stats) = overrides.stats {
        config.general.stats = stats;
    }
    if let Some(seed) = overrides.seed {
        config.general.seed = seed;
    }
    if let Some(platform) = overrides.platform {
        config.general.platform = platform;
    }

    config.validate()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_partial_config() {
        let yaml = r#"
general:
  api: forums
  mode: ttl
  log_dir: "/tmp/edgesim-logs"
scale:
  interval: "2s"
  batch_size: 5
  batches: 10
timeouts:
  shutdown: "10s"
  origin_shutdown: "1m"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.general.api, Some(Api::Forums));
        assert_eq!(config.general.mode, Some(Mode::Ttl));
        assert_eq!(config.scale.interval, Duration::from_secs(2));
        assert_eq!(config.scale.target_clients(), 50);
        assert_eq!(config.timeouts.shutdown, Duration::from_secs(10));
        assert_eq!(config.timeouts.origin_shutdown, Some(Duration::from_secs(60)));
        // Untouched sections keep their defaults
        assert_eq!(config.timeouts.warmup, Duration::from_secs(2));
        assert_eq!(config.network.edge_distances_km.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_network_section() {
        let yaml = r#"
network:
  backbone: "192.168.0.0/24"
  client_subnets: ["172.16.1.0/24", "172.16.2.0/24"]
  edge_distances_km: [0, 250]
  client_distance_km: { min: 10, max: 20 }
  total_cores: 8
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", yaml).unwrap();

        let config = load_config(temp_file.path()).unwrap();
        let params = config.topology_params();
        assert_eq!(params.backbone.to_string(), "192.168.0.0/24");
        assert_eq!(params.num_edges(), 2);
        assert_eq!(params.total_cores, 8);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "general:\n  mode: lru\n").unwrap();
        assert!(load_config(temp_file.path()).is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = ExperimentConfig::default();
        let overrides = CliOverrides {
            api: Some(Api::Flights),
            mode: Some(Mode::Proxy),
            scale_size: Some(3),
            scale_times: Some(4),
            stats: Some(true),
            ..CliOverrides::default()
        };

        apply_cli_overrides(&mut config, &overrides).unwrap();
        assert_eq!(config.scale.target_clients(), 12);
        assert!(config.general.stats);
        assert_eq!(config.general.mode, Some(Mode::Proxy));
    }

    #[test]
    fn test_overrides_are_validated() {
        let mut config = ExperimentConfig::default();
        let overrides = CliOverrides {
            api: Some(Api::Flights),
            ..CliOverrides::default()
        };
        // mode still missing
        assert!(apply_cli_overrides(&mut config, &overrides).is_err());
    }
}
