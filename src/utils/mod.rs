//! Shared utilities: binary resolution, duration parsing, plan validation,
//! log duplication.

pub mod binary;
pub mod duration;
pub mod tee;
pub mod validation;

pub use binary::{resolve_binary_path, validate_binary, validate_binary_spec, validate_server_command, BinaryError};
pub use duration::parse_duration;
pub use tee::TeeWriter;
pub use validation::validate_plan;
