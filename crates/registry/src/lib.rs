//! Local breakpoint registry
//!
//! This crate provides:
//! - `BreakpointInfo` entries with an explicit `HitState`
//! - `BreakpointRegistry`, the record of breakpoints this proxy instance owns

pub mod entry;
pub mod registry;

// Re-exports
pub use entry::{BreakpointInfo, HitState};
pub use registry::{BreakpointRegistry, RegistryError};

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
