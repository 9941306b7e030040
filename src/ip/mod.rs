//! IP address allocation and management module.
//!
//! This module hands out host addresses from the CIDR blocks of the emulated
//! network (the origin/edge backbone and one client subnet per edge) and keeps
//! a registry that guarantees no address is ever handed out twice.

pub mod allocator;
pub mod registry;

// Re-export commonly used types
pub use allocator::{AllocationError, SubnetAllocator};
pub use registry::IpRegistry;
