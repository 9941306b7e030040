use crate::topology::builder::net16;
use crate::topology::TopologyParams;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Workload the clients run against the origin
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Api {
    Flights,
    Forums,
}

/// Caching/consistency strategy of the edges, passed through to the clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Pass-through proxy to the origin
    Proxy,
    /// Unconditional cache
    Cache,
    /// TTL-bounded cache
    Ttl,
    /// CRDT-based replicated cache
    Crdt,
}

/// Which emulation platform realizes the network
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// Linux network namespaces, bridges and netem (needs root)
    Netns,
    /// No isolation, processes run directly on the machine
    Local,
}

impl Api {
    pub fn as_str(&self) -> &'static str {
        match self {
            Api::Flights => "flights",
            Api::Forums => "forums",
        }
    }
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Proxy => "proxy",
            Mode::Cache => "cache",
            Mode::Ttl => "ttl",
            Mode::Crdt => "crdt",
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Complete experiment configuration.
///
/// Every section has defaults, so an empty YAML document plus `--api` and
/// `--mode` on the command line is a valid experiment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub servers: ServersConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    pub api: Option<Api>,
    pub mode: Option<Mode>,
    pub log_dir: PathBuf,
    /// Attach resource samplers and record interface counters
    pub stats: bool,
    pub seed: u64,
    pub platform: PlatformKind,
    /// Prefix of namespace, bridge and veth names
    pub namespace_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScaleConfig {
    /// Pause after every batch of new clients
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub batch_size: usize,
    pub batches: usize,
}

impl ScaleConfig {
    /// Number of clients the experiment ramps up to. Saturates on configs
    /// that `validate` rejects.
    pub fn target_clients(&self) -> usize {
        self.batch_size.saturating_mul(self.batches)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DistanceRange {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    pub backbone: Ipv4Net,
    /// One private client subnet per edge
    pub client_subnets: Vec<Ipv4Net>,
    /// Origin <-> edge distance in km, one entry per edge
    pub edge_distances_km: Vec<u32>,
    pub client_distance_km: DistanceRange,
    /// Cores of the machine; detected when absent
    pub total_cores: Option<usize>,
    /// Cores left to the system and the orchestrator
    pub reserved_cores: usize,
    pub origin_cores: usize,
    pub edge_cores: usize,
    /// Fewer live edges than this after start-up aborts the experiment
    pub min_live_edges: usize,
}

/// Where and how a server process is started
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerCommand {
    /// Working directory of the process
    pub dir: PathBuf,
    /// Program, relative to `dir` or absolute
    pub command: PathBuf,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServersConfig {
    pub origin: ServerCommand,
    pub edge: ServerCommand,
    pub redis_port: u16,
    pub client_binary: PathBuf,
    pub sampler_binary: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Pause after starting the origin, before edges reference it
    #[serde(with = "humantime_serde")]
    pub warmup: Duration,
    /// Pause after the control plane is up, before checking connectivity
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// Per-phase wait for clients and edges to exit after the interrupt
    #[serde(with = "humantime_serde")]
    pub shutdown: Duration,
    /// Wait for the origin to exit; unbounded when absent
    #[serde(with = "humantime_serde")]
    pub origin_shutdown: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub ping: Duration,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid scale configuration: {0}")]
    InvalidScale(String),
    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServers(String),
}

impl ExperimentConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.general.validate()?;
        self.scale.validate()?;
        self.network.validate()?;
        self.servers.validate()?;
        Ok(())
    }

    pub fn api(&self) -> Result<Api, ValidationError> {
        self.general
            .api
            .ok_or_else(|| ValidationError::InvalidGeneral("api must be set".to_string()))
    }

    pub fn mode(&self) -> Result<Mode, ValidationError> {
        self.general
            .mode
            .ok_or_else(|| ValidationError::InvalidGeneral("mode must be set".to_string()))
    }

    /// Inputs for the network plan builder
    pub fn topology_params(&self) -> TopologyParams {
        let network = &self.network;
        TopologyParams {
            seed: self.general.seed,
            backbone: network.backbone,
            client_subnets: network.client_subnets.clone(),
            edge_distances_km: network.edge_distances_km.clone(),
            client_distance_km: (network.client_distance_km.min, network.client_distance_km.max),
            total_cores: network.total_cores.unwrap_or_else(num_cpus::get),
            reserved_cores: network.reserved_cores,
            origin_cores: network.origin_cores,
            edge_cores: network.edge_cores,
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.api.is_none() {
            return Err(ValidationError::InvalidGeneral("api must be set".to_string()));
        }
        if self.mode.is_none() {
            return Err(ValidationError::InvalidGeneral("mode must be set".to_string()));
        }
        if self.log_dir.as_os_str().is_empty() {
            return Err(ValidationError::InvalidGeneral("log_dir cannot be empty".to_string()));
        }
        let prefix = &self.namespace_prefix;
        if prefix.is_empty() || prefix.len() > 4 || !prefix.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidGeneral(format!(
                "namespace_prefix must be 1-4 alphanumeric characters, got '{}'",
                prefix
            )));
        }
        Ok(())
    }
}

impl ScaleConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidScale("batch_size must be at least 1".to_string()));
        }
        if self.batches == 0 {
            return Err(ValidationError::InvalidScale("batches must be at least 1".to_string()));
        }
        if self.batch_size.checked_mul(self.batches).is_none() {
            return Err(ValidationError::InvalidScale(format!(
                "{} batches of {} clients overflow the client count",
                self.batches, self.batch_size
            )));
        }
        Ok(())
    }
}

impl NetworkConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let edges = self.edge_distances_km.len();
        if edges == 0 {
            return Err(ValidationError::InvalidNetwork("at least one edge is required".to_string()));
        }
        if self.client_subnets.len() != edges {
            return Err(ValidationError::InvalidNetwork(format!(
                "{} client subnets configured for {} edges",
                self.client_subnets.len(),
                edges
            )));
        }
        let mut blocks = vec![self.backbone];
        blocks.extend(self.client_subnets.iter().copied());
        for (i, a) in blocks.iter().enumerate() {
            for b in &blocks[i + 1..] {
                if a.contains(b) || b.contains(a) {
                    return Err(ValidationError::InvalidNetwork(format!("subnets {} and {} overlap", a, b)));
                }
            }
        }
        if self.client_distance_km.min > self.client_distance_km.max {
            return Err(ValidationError::InvalidNetwork(format!(
                "client distance range {}..{} is empty",
                self.client_distance_km.min, self.client_distance_km.max
            )));
        }
        if self.min_live_edges > edges {
            return Err(ValidationError::InvalidNetwork(format!(
                "min_live_edges {} exceeds the {} configured edges",
                self.min_live_edges, edges
            )));
        }
        if self.total_cores == Some(0) {
            return Err(ValidationError::InvalidNetwork("total_cores cannot be 0".to_string()));
        }
        Ok(())
    }
}

impl ServersConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let ports = [
            ("origin port", self.origin.port),
            ("edge port", self.edge.port),
            ("redis port", self.redis_port),
        ];
        if let Some((name, _)) = ports.iter().find(|(_, port)| *port == 0) {
            return Err(ValidationError::InvalidServers(format!("{} cannot be 0", name)));
        }
        if self.edge.port == self.redis_port {
            return Err(ValidationError::InvalidServers(format!(
                "edge port and redis port are both {}",
                self.redis_port
            )));
        }
        if self.client_binary.as_os_str().is_empty() {
            return Err(ValidationError::InvalidServers("client_binary cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Default implementations
impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            api: None,
            mode: None,
            log_dir: PathBuf::from("logs"),
            stats: false,
            seed: 42,
            platform: PlatformKind::Netns,
            namespace_prefix: "es".to_string(),
        }
    }
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            batch_size: 1,
            batches: 500,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            backbone: net16(0),
            client_subnets: (1..=5).map(net16).collect(),
            edge_distances_km: vec![0, 1000, 1000, 1000, 1000],
            client_distance_km: DistanceRange { min: 50, max: 500 },
            total_cores: None,
            reserved_cores: 2,
            origin_cores: 1,
            edge_cores: 2,
            min_live_edges: 1,
        }
    }
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            origin: ServerCommand {
                dir: PathBuf::from("origin-ts"),
                command: PathBuf::from("src/index.ts"),
                port: 3000,
            },
            edge: ServerCommand {
                dir: PathBuf::from("edge-cache-ts"),
                command: PathBuf::from("src/index.ts"),
                port: 8005,
            },
            redis_port: 8006,
            client_binary: PathBuf::from("auto-client/main.py"),
            sampler_binary: PathBuf::from("psrecord"),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(2),
            settle: Duration::from_secs(1),
            shutdown: Duration::from_secs(30),
            origin_shutdown: None,
            ping: Duration::from_millis(300),
        }
    }
}
