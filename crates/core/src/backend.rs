//! Remote debug backend boundary
//!
//! The proxy never talks to a transport directly. Everything it needs from the
//! remote debugger service goes through [`DebugBackend`].

use crate::model::{Breakpoint, BreakpointRequest, Debuggee, ListBreakpointsResponse, ProjectId};
use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Result type for backend calls
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors surfaced by a backend implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Long poll elapsed with no change (HTTP 409 / `ABORTED`)
    #[error("long poll aborted without changes")]
    Aborted,

    #[error("not found: {0}")]
    NotFound(String),

    /// No usable credential or project id
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Response did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl BackendError {
    /// Only the long-poll abort is retried, and only by the list call site
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Aborted)
    }
}

/// Remote debugger service
///
/// All calls may suspend. `list_breakpoints` with a non-empty wait token may
/// suspend for a backend-defined duration before returning either a changed
/// list or [`BackendError::Aborted`].
#[async_trait]
pub trait DebugBackend: Send + Sync {
    /// Resolve credentials (optionally from a key file) to a project id
    async fn authorize(&self, key_file: Option<&Path>) -> BackendResult<ProjectId>;

    async fn list_debuggees(&self, project_id: &str) -> BackendResult<Vec<Debuggee>>;

    /// List pending breakpoints of a debuggee
    ///
    /// An empty `wait_token` returns immediately.
    async fn list_breakpoints(
        &self,
        debuggee_id: &str,
        wait_token: &str,
    ) -> BackendResult<ListBreakpointsResponse>;

    async fn get_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> BackendResult<Breakpoint>;

    async fn set_breakpoint(
        &self,
        debuggee_id: &str,
        request: &BreakpointRequest,
    ) -> BackendResult<Breakpoint>;

    async fn delete_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> BackendResult<()>;
}
