//! Core types for the Stakeout breakpoint proxy
//!
//! This crate provides:
//! - Breakpoint and debuggee data model (camelCase wire names)
//! - The `DebugBackend` trait consumed by the proxy
//! - Response and request validation
//! - An in-process backend implementing the long-poll protocol

pub mod backend;
pub mod memory;
pub mod model;
pub mod validate;

// Re-exports
pub use backend::{BackendError, BackendResult, DebugBackend};
pub use memory::{MemoryBackend, Op};
pub use model::{
    Action, Breakpoint, BreakpointRequest, Debuggee, FormatMessage, ListBreakpointsResponse,
    LogLevel, ProjectId, Reference, SourceLocation, StackFrame, StatusMessage, Variable,
};
pub use validate::ValidationError;
