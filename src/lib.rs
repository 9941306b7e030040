//! # Edgesim - Experiment harness for edge caching on an emulated WAN
//!
//! This library builds an emulated wide-area network with one origin server,
//! several edge sites and a growing fleet of load-generating clients, runs the
//! servers and clients inside it, and stops everything again in order.
//!
//! ## Overview
//!
//! Edgesim lets an experimenter compare caching and consistency strategies of
//! edge servers under parameterized latency instead of on a flat local network.
//! The origin, edge and client programs are external; edgesim only places them,
//! configures them through their environment and command line, captures their
//! output and supervises their lifetime.
//!
//! ## Key Features
//!
//! - **Deterministic Topology**: Seeded plan with unique addresses and CPU pinning
//! - **Latency Model**: Link delays derived from distance (`rtt = 10.89ms + 0.02ms/km`)
//! - **Live Scale-up**: Clients added in batches at a fixed cadence
//! - **Ordered Shutdown**: Clients, then edges, then origin, bounded by timeouts
//! - **Resource Sampling**: Optional per-process samplers and interface counters
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `config`: Experiment configuration structures and validation
//! - `config_loader`: YAML loading and command-line overrides
//! - `topology`: Latency model, core assignment and the network plan builder
//! - `ip`: Subnet address allocation and the address registry
//! - `platform`: Emulation platforms (Linux network namespaces, local)
//! - `process`: Process launching, environments, samplers and shutdown
//! - `scale`: The client scale-up loop
//! - `stats`: Network interface counter sampling
//! - `events`: Structured experiment events
//! - `cancel`: Cooperative cancellation
//! - `utils`: Utility functions and helpers
//! - `orchestrator`: High-level driver of a single run
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use edgesim::config::{Api, ExperimentConfig, Mode};
//! use edgesim::orchestrator::Experiment;
//! use edgesim::platform::NetnsPlatform;
//!
//! let mut config = ExperimentConfig::default();
//! config.general.api = Some(Api::Flights);
//! config.general.mode = Some(Mode::Crdt);
//! config.scale.batches = 10;
//!
//! let experiment = Experiment::new(config)?;
//! let summary = experiment.run(&NetnsPlatform::new("es"))?;
//! println!("{} clients started", summary.active_clients);
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Configuration Format
//!
//! Every setting has a default; a minimal file only selects the workload:
//!
//! ```yaml
//! general:
//!   api: flights
//!   mode: ttl
//!   log_dir: logs/ttl-run
//! scale:
//!   interval: 5s
//!   batch_size: 2
//!   batches: 100
//! ```

pub mod cancel;
pub mod config;
pub mod config_loader;
pub mod events;
pub mod ip;
pub mod orchestrator;
pub mod platform;
pub mod process;
pub mod scale;
pub mod stats;
pub mod topology;
pub mod utils;

// Re-export commonly used types
pub use config::ExperimentConfig;
pub use orchestrator::{Experiment, ExperimentError, RunSummary};
pub use topology::{build_plan, link_delay, NetworkPlan};
