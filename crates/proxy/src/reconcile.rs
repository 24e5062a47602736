//! Long-poll reconciliation of owned breakpoints
//!
//! One pass lists the debuggee's pending breakpoints, compares the list with
//! the registry and resolves every owned breakpoint that dropped off the list:
//! either it fired (final state) or somebody else deleted it.

use crate::error::{ProxyError, Result};
use crate::proxy::{is_already_gone, DebugProxy};
use futures::future::BoxFuture;
use futures::FutureExt;
use registry::RegistryError;
use stakeout_core::validate::{validate_breakpoint, validate_breakpoints};
use stakeout_core::{Breakpoint, ListBreakpointsResponse};
use std::collections::HashMap;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of background deletes dispatched by a pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Handle to the best-effort deletes of one pass
///
/// Dropping it leaves the deletes running.
#[derive(Debug, Default)]
pub struct CleanupHandle(Option<JoinHandle<Vec<(String, bool)>>>);

impl CleanupHandle {
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Wait for every delete to settle
    pub async fn wait(self) -> CleanupSummary {
        match self.0 {
            None => CleanupSummary::default(),
            Some(handle) => match handle.await {
                Ok(outcomes) => {
                    let deleted = outcomes.iter().filter(|(_, ok)| *ok).count();
                    CleanupSummary {
                        deleted,
                        failed: outcomes.len() - deleted,
                    }
                }
                Err(e) => {
                    warn!("Breakpoint cleanup task failed: {}", e);
                    CleanupSummary::default()
                }
            },
        }
    }
}

/// What one reconciliation pass observed and changed
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Owned ids the remote list still reports as pending
    pub pending: Vec<String>,
    /// Owned ids that became final during this pass
    pub hit: Vec<String>,
    /// Owned ids found removed by someone else and evicted
    pub evicted: Vec<String>,
    /// Long-poll aborts retried before the list succeeded
    pub retries: usize,
    pub cleanup: CleanupHandle,
}

impl ReconcileReport {
    pub fn notified(&self) -> bool {
        !self.hit.is_empty()
    }
}

impl DebugProxy {
    /// Reconcile the owned breakpoints with the remote pending list
    ///
    /// With `block` set this is a true long poll: it echoes the last wait
    /// token and may suspend until the list changes. Long-poll aborts are
    /// retried; any other error aborts the pass, after which the caller
    /// should treat state as unknown and run a full pass again.
    ///
    /// Raises at most one `breakpointHit` notification.
    ///
    /// Every owned entry missing from the list is fetched, hit entries
    /// included: a hit snapshot is re-checked on each pass until the entry
    /// is removed locally (`remove_breakpoint`, `remove_all_breakpoints`).
    /// An owned breakpoint the server no longer knows (`NotFound`) fails the
    /// pass like any other get error, and the entry is kept.
    pub async fn update_pending_breakpoints(&self, block: bool) -> Result<ReconcileReport> {
        let debuggee_id = self.debuggee_id()?;
        let mut wait_token = self.wait_token.lock().await;

        // Entries created while the list call is outstanding may be missing
        // from its answer; only judge what existed before it.
        let candidates = self.registry.snapshot();

        let token = if block { wait_token.clone() } else { String::new() };
        let (response, retries) = self.list_until_settled(&debuggee_id, &token).await?;
        validate_breakpoints(&response.breakpoints)?;
        *wait_token = response.next_wait_token;

        let listed: HashMap<&str, &Breakpoint> = response
            .breakpoints
            .iter()
            .map(|bp| (bp.id.as_str(), bp))
            .collect();

        let mut report = ReconcileReport {
            retries,
            ..ReconcileReport::default()
        };
        let mut ambiguous = Vec::new();
        for info in &candidates {
            match listed.get(info.id()) {
                Some(_) if info.is_hit() => {
                    error!("Breakpoint {} is listed as pending after it was hit", info.id());
                    return Err(ProxyError::Invariant(format!(
                        "breakpoint {} was hit but is listed as pending again",
                        info.id()
                    )));
                }
                Some(bp) => report.pending.push(bp.id.clone()),
                None => ambiguous.push(info.id().to_string()),
            }
        }

        for id in &report.pending {
            if let Some(bp) = listed.get(id.as_str()) {
                self.registry.refresh(id, (*bp).clone())?;
            }
        }

        debug!(
            "Reconcile {}: {} listed, {} owned pending, {} to resolve",
            debuggee_id,
            listed.len(),
            report.pending.len(),
            ambiguous.len()
        );

        let resolved = self.resolve(&debuggee_id, ambiguous).await?;

        let mut to_delete = Vec::new();
        for (id, bp) in resolved {
            if bp.is_final() {
                if self.record_hit(&id, bp)? {
                    report.hit.push(id);
                }
            } else if self.evict_removed(&id)? {
                to_delete.push(id.clone());
                report.evicted.push(id);
            }
        }

        report.cleanup = self.dispatch_cleanup(&debuggee_id, to_delete);

        if !report.hit.is_empty() {
            info!("Breakpoints hit: {}", report.hit.join(", "));
            self.notifier.breakpoint_hit();
        }
        if !report.evicted.is_empty() {
            info!("Breakpoints removed remotely: {}", report.evicted.join(", "));
        }

        Ok(report)
    }

    /// List breakpoints, retrying long-poll aborts until a real answer
    async fn list_until_settled(
        &self,
        debuggee_id: &str,
        token: &str,
    ) -> Result<(ListBreakpointsResponse, usize)> {
        let mut retries = 0;
        loop {
            match self.backend.list_breakpoints(debuggee_id, token).await {
                Ok(response) => return Ok((response, retries)),
                Err(e) if e.is_retryable() => {
                    retries += 1;
                    debug!("Long poll on {} aborted without change (retry {})", debuggee_id, retries);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Fetch each id through the executor; the first failure aborts the batch
    async fn resolve(&self, debuggee_id: &str, ids: Vec<String>) -> Result<Vec<(String, Breakpoint)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let backend = &self.backend;
        let ops = ids.into_iter().map(|id| {
            let key = id.clone();
            (key, move || async move { backend.get_breakpoint(debuggee_id, &id).await })
        });

        let resolved: Vec<(String, Breakpoint)> = self.executor.try_run_all(ops).await?;

        for (_, bp) in &resolved {
            validate_breakpoint(bp)?;
        }
        Ok(resolved)
    }

    /// Returns true if the entry newly became hit
    fn record_hit(&self, id: &str, bp: Breakpoint) -> Result<bool> {
        match self.registry.mark_hit(id, bp) {
            Ok(newly_hit) => Ok(newly_hit),
            Err(RegistryError::Missing(_)) => {
                debug!("Breakpoint {} was removed locally during reconciliation", id);
                Ok(false)
            }
            Err(RegistryError::DivergentFinalState(_)) => {
                error!("Final breakpoint {} changed on the server", id);
                Err(ProxyError::Invariant(format!(
                    "final breakpoint {} differs from its captured snapshot",
                    id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Evict a breakpoint that is neither listed nor final
    ///
    /// Returns true if it was evicted by this call.
    fn evict_removed(&self, id: &str) -> Result<bool> {
        match self.registry.get(id) {
            None => Ok(false),
            Some(info) if info.is_hit() => {
                error!("Hit breakpoint {} is no longer final on the server", id);
                Err(ProxyError::Invariant(format!(
                    "breakpoint {} was hit but is no longer final",
                    id
                )))
            }
            Some(_) => Ok(self.registry.remove_if_pending(id).is_some()),
        }
    }

    /// Start best-effort deletes without waiting for them
    fn dispatch_cleanup(&self, debuggee_id: &str, ids: Vec<String>) -> CleanupHandle {
        if ids.is_empty() {
            return CleanupHandle::default();
        }

        let ops: Vec<(String, BoxFuture<'static, bool>)> = ids
            .into_iter()
            .map(|id| {
                let (id, op) = self.delete_task(debuggee_id, id);
                let key = id.clone();
                let outcome = op().map(move |result| match result {
                    Ok(()) => true,
                    Err(e) if is_already_gone(&e) => {
                        debug!("Breakpoint {} already deleted", id);
                        true
                    }
                    Err(e) => {
                        warn!("Best-effort delete of breakpoint {} failed: {}", id, e);
                        false
                    }
                });
                (key, outcome.boxed())
            })
            .collect();

        CleanupHandle(Some(self.executor.spawn_all(ops)))
    }
}
