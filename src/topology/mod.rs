//! Network topology module.
//!
//! This module contains the latency model, the CPU core assignment and the
//! builder producing the immutable [`NetworkPlan`] of an experiment.

pub mod builder;
pub mod cores;
pub mod latency;
pub mod types;

// Re-export key types and functions for easier access
pub use builder::{build_plan, client_name, edge_name, TopologyParams};
pub use latency::{link_delay, LinkDelay};
pub use types::{ClientSpec, CoreSet, EdgeSpec, HostRole, HostSpec, LinkSpec, NetworkPlan, SwitchSpec};
