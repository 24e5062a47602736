//! Proxy error taxonomy

use registry::RegistryError;
use stakeout_core::{BackendError, ValidationError};
use thiserror::Error;

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    /// No project id; call `authorize` or configure one
    #[error("no project selected")]
    NoProject,

    #[error("no debuggee selected")]
    NoDebuggee,

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The id is not in this instance's registry
    #[error("breakpoint {0} is not owned by this proxy")]
    NotOwned(String),

    #[error("invalid breakpoint data: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Remote state moved in a way that should be impossible
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Some deletes of an evicted batch failed; entries stay evicted
    #[error("{failed} of {total} breakpoint deletions failed")]
    Cleanup { failed: usize, total: usize },
}

impl ProxyError {
    /// Caller must re-configure before retrying
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProxyError::NoProject
                | ProxyError::NoDebuggee
                | ProxyError::Config(_)
                | ProxyError::Backend(BackendError::Unauthorized(_))
        )
    }
}
