//! Breakpoint proxy for a single debuggee
//!
//! This crate provides:
//! - `DebugProxy`: owned-breakpoint CRUD against a `DebugBackend`
//! - Long-poll reconciliation of the owned set with the remote list
//! - A bounded executor for batches of backend calls
//! - `breakpointHit` notification over a broadcast channel

pub mod config;
pub mod error;
pub mod executor;
pub mod notify;
pub mod proxy;
pub mod reconcile;

// Re-exports
pub use config::ProxyConfig;
pub use error::{ProxyError, Result};
pub use executor::{BoundedExecutor, DEFAULT_CONCURRENCY};
pub use notify::{Notifier, ProxyEvent};
pub use proxy::DebugProxy;
pub use reconcile::{CleanupHandle, CleanupSummary, ReconcileReport};

pub use registry::{BreakpointInfo, HitState};
