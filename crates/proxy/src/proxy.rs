//! Owned-breakpoint operations against one debuggee

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::executor::BoundedExecutor;
use crate::notify::{Notifier, ProxyEvent};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use registry::{BreakpointInfo, BreakpointRegistry, HitState};
use stakeout_core::validate::{validate_breakpoint, validate_debuggees, validate_request};
use stakeout_core::{BackendError, BackendResult, Breakpoint, BreakpointRequest, DebugBackend, Debuggee, ProjectId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Debugger proxy for a single debuggee
///
/// Tracks the breakpoints this instance created and never touches any other
/// breakpoint on the debuggee.
pub struct DebugProxy {
    pub(crate) backend: Arc<dyn DebugBackend>,
    pub(crate) registry: BreakpointRegistry,
    pub(crate) executor: BoundedExecutor,
    pub(crate) notifier: Notifier,
    project_id: RwLock<Option<ProjectId>>,
    debuggee_id: RwLock<Option<String>>,
    key_file: Option<PathBuf>,
    /// Held for a whole reconciliation pass, so passes never overlap
    pub(crate) wait_token: Mutex<String>,
}

impl DebugProxy {
    /// Proxy with default settings and nothing selected
    pub fn new(backend: Arc<dyn DebugBackend>) -> Self {
        let config = ProxyConfig::default();
        Self::build(backend, &config)
    }

    /// Proxy with project, debuggee and limits taken from `config`
    pub fn from_config(backend: Arc<dyn DebugBackend>, config: &ProxyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(backend, config))
    }

    fn build(backend: Arc<dyn DebugBackend>, config: &ProxyConfig) -> Self {
        Self {
            backend,
            registry: BreakpointRegistry::new(),
            executor: BoundedExecutor::new(config.concurrency),
            notifier: Notifier::new(config.event_capacity),
            project_id: RwLock::new(config.project_id.clone()),
            debuggee_id: RwLock::new(config.debuggee_id.clone()),
            key_file: config.key_file.clone(),
            wait_token: Mutex::new(String::new()),
        }
    }

    /// Resolve credentials and remember the project
    ///
    /// Falls back to the configured key file when `key_file` is `None`.
    pub async fn authorize(&self, key_file: Option<&Path>) -> Result<ProjectId> {
        let key_file = key_file.or(self.key_file.as_deref());
        let project_id = self.backend.authorize(key_file).await?;

        info!("Authorized for project {}", project_id);
        *self.project_id.write() = Some(project_id.clone());
        Ok(project_id)
    }

    pub fn project_id(&self) -> Result<ProjectId> {
        self.project_id.read().clone().ok_or(ProxyError::NoProject)
    }

    pub fn debuggee_id(&self) -> Result<String> {
        self.debuggee_id.read().clone().ok_or(ProxyError::NoDebuggee)
    }

    /// Debuggees registered under the current project
    pub async fn debuggees(&self) -> Result<Vec<Debuggee>> {
        let project_id = self.project_id()?;
        let debuggees = self.backend.list_debuggees(&project_id).await?;
        validate_debuggees(&debuggees)?;
        Ok(debuggees)
    }

    /// Switch to another debuggee
    ///
    /// Only allowed while no breakpoints are owned; the wait token restarts.
    pub async fn select_debuggee(&self, debuggee_id: &str) -> Result<()> {
        if debuggee_id.is_empty() {
            return Err(ProxyError::Config("debuggee id must not be empty".to_string()));
        }

        let mut wait_token = self.wait_token.lock().await;
        if !self.registry.is_empty() {
            return Err(ProxyError::Config(format!(
                "{} breakpoints still owned; remove them before switching debuggee",
                self.registry.len()
            )));
        }

        wait_token.clear();
        *self.debuggee_id.write() = Some(debuggee_id.to_string());
        debug!("Selected debuggee {}", debuggee_id);
        Ok(())
    }

    /// Create a breakpoint and take ownership of it
    pub async fn set_breakpoint(&self, request: &BreakpointRequest) -> Result<Breakpoint> {
        let debuggee_id = self.debuggee_id()?;
        validate_request(request)?;

        let bp = self.backend.set_breakpoint(&debuggee_id, request).await?;
        validate_breakpoint(&bp)?;
        self.registry.insert(BreakpointInfo::pending(bp.clone()))?;

        info!("Set breakpoint {} at {}", bp.id, bp.location);
        Ok(bp)
    }

    /// Current server state of an owned breakpoint
    pub async fn get_breakpoint(&self, id: &str) -> Result<Breakpoint> {
        let debuggee_id = self.debuggee_id()?;
        if !self.registry.contains(id) {
            return Err(ProxyError::NotOwned(id.to_string()));
        }

        let bp = self.backend.get_breakpoint(&debuggee_id, id).await?;
        validate_breakpoint(&bp)?;
        Ok(bp)
    }

    /// Evict an owned breakpoint, then delete it remotely
    pub async fn remove_breakpoint(&self, id: &str) -> Result<()> {
        let debuggee_id = self.debuggee_id()?;
        if self.registry.remove(id).is_none() {
            return Err(ProxyError::NotOwned(id.to_string()));
        }

        self.backend.delete_breakpoint(&debuggee_id, id).await?;
        info!("Removed breakpoint {}", id);
        Ok(())
    }

    /// Evict every owned breakpoint and delete them remotely
    ///
    /// Returns the number deleted. Failed deletes do not restore entries.
    pub async fn remove_all_breakpoints(&self) -> Result<usize> {
        let debuggee_id = self.debuggee_id()?;
        let ids: Vec<String> = self
            .registry
            .drain()
            .into_iter()
            .map(|info| info.id().to_string())
            .collect();

        self.delete_batch(&debuggee_id, ids).await
    }

    /// Evict and delete the pending breakpoints set on `path`
    ///
    /// Breakpoints that already fired are kept. Returns the evicted ids.
    pub async fn remove_pending_breakpoints_for_file(&self, path: &str) -> Result<Vec<String>> {
        let debuggee_id = self.debuggee_id()?;
        let ids: Vec<String> = self
            .registry
            .remove_pending_for_path(path)
            .into_iter()
            .map(|info| info.id().to_string())
            .collect();

        self.delete_batch(&debuggee_id, ids.clone()).await?;
        Ok(ids)
    }

    /// Last known owned breakpoints in the given state
    pub fn breakpoints(&self, state: HitState) -> Vec<Breakpoint> {
        self.registry.filter_by_state(state)
    }

    pub fn is_owned(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    pub fn registry(&self) -> &BreakpointRegistry {
        &self.registry
    }

    /// Receive `breakpointHit` notifications
    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.notifier.subscribe()
    }

    pub(crate) fn delete_task(&self, debuggee_id: &str, id: String) -> (String, DeleteOp) {
        delete_task(self.backend.clone(), debuggee_id.to_string(), id)
    }

    async fn delete_batch(&self, debuggee_id: &str, ids: Vec<String>) -> Result<usize> {
        let total = ids.len();
        if total == 0 {
            return Ok(0);
        }

        let ops: Vec<_> = ids
            .into_iter()
            .map(|id| self.delete_task(debuggee_id, id))
            .collect();
        let results = self.executor.run_all(ops).await;

        let failed = results
            .iter()
            .filter(|(id, result)| match result {
                Ok(()) => false,
                Err(e) => {
                    warn!("Failed to delete breakpoint {}: {}", id, e);
                    true
                }
            })
            .count();

        if failed > 0 {
            return Err(ProxyError::Cleanup { failed, total });
        }
        info!("Removed {} breakpoints", total);
        Ok(total)
    }
}

/// Deferred delete call, runnable through the executor or on a spawned task
pub(crate) type DeleteOp = Box<dyn FnOnce() -> BoxFuture<'static, BackendResult<()>> + Send>;

fn delete_task(backend: Arc<dyn DebugBackend>, debuggee_id: String, id: String) -> (String, DeleteOp) {
    let key = id.clone();
    let op: DeleteOp = Box::new(move || {
        Box::pin(async move { backend.delete_breakpoint(&debuggee_id, &id).await })
    });
    (key, op)
}

/// A delete answered with `NotFound` already achieved its goal
pub(crate) fn is_already_gone(error: &BackendError) -> bool {
    matches!(error, BackendError::NotFound(_))
}
