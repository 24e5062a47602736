//! Proxy configuration

use crate::error::{ProxyError, Result};
use crate::executor::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound for the executor ceiling
pub const MAX_CONCURRENCY: usize = 256;

/// Default capacity of the notification channel
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// Settings for one [`DebugProxy`](crate::DebugProxy)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Skip `authorize` and use this project
    pub project_id: Option<String>,

    /// Debuggee to manage breakpoints on
    pub debuggee_id: Option<String>,

    /// Service-account key file passed to `authorize`
    pub key_file: Option<PathBuf>,

    /// Max simultaneous backend calls in a batch (default: 10)
    pub concurrency: usize,

    /// Buffered notifications per subscriber (default: 16)
    pub event_capacity: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            debuggee_id: None,
            key_file: None,
            concurrency: DEFAULT_CONCURRENCY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ProxyConfig {
    /// Parse from TOML; missing keys take their defaults
    pub fn from_toml(source: &str) -> Result<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ProxyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(ProxyError::Config(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }
        if self.event_capacity == 0 {
            return Err(ProxyError::Config("event_capacity must be at least 1".to_string()));
        }
        if matches!(self.project_id.as_deref(), Some("")) {
            return Err(ProxyError::Config("project_id must not be empty".to_string()));
        }
        if matches!(self.debuggee_id.as_deref(), Some("")) {
            return Err(ProxyError::Config("debuggee_id must not be empty".to_string()));
        }
        Ok(())
    }
}
