//! In-process debugger backend
//!
//! Keeps debuggees and breakpoints in memory and implements the same
//! long-poll contract as the remote service: a list call echoing the current
//! wait token blocks until the breakpoint set changes, or returns
//! [`BackendError::Aborted`] once `poll_timeout` elapses.
//!
//! The agent side (capturing snapshots, deletions by other users) is driven
//! through the inherent methods. A breakpoint deleted by another user drops
//! out of the list but stays readable through `get_breakpoint` until it is
//! deleted again, the way the remote service keeps deleted breakpoints. Call counters and scripted failures make it
//! usable as a test double.

use crate::backend::{BackendError, BackendResult, DebugBackend};
use crate::model::{
    Breakpoint, BreakpointRequest, Debuggee, ListBreakpointsResponse, ProjectId, StackFrame,
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace};
use ulid::Ulid;

/// Default server-side long-poll window
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// Backend operation, used for call counting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Authorize,
    ListDebuggees,
    ListBreakpoints,
    GetBreakpoint,
    SetBreakpoint,
    DeleteBreakpoint,
}

/// Service-account key file shape (only the field we need)
#[derive(Deserialize)]
struct KeyFile {
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Default)]
struct State {
    debuggees: Vec<Debuggee>,
    /// debuggee id -> breakpoint id -> breakpoint
    breakpoints: BTreeMap<String, BTreeMap<String, Breakpoint>>,
    /// Deleted by another client; unlisted but still readable
    removed: BTreeMap<String, BTreeMap<String, Breakpoint>>,
    failures: VecDeque<(Op, BackendError)>,
    pending_aborts: usize,
    deleted: Vec<String>,
}

impl State {
    fn debuggee_breakpoints(&mut self, debuggee_id: &str) -> BackendResult<&mut BTreeMap<String, Breakpoint>> {
        if !self.debuggees.iter().any(|d| d.id == debuggee_id) {
            return Err(BackendError::NotFound(format!("debuggee {}", debuggee_id)));
        }
        Ok(self.breakpoints.entry(debuggee_id.to_string()).or_default())
    }
}

/// In-memory [`DebugBackend`]
pub struct MemoryBackend {
    default_project: Option<ProjectId>,
    poll_timeout: Duration,
    latency: Duration,
    state: Mutex<State>,
    /// Change counter; its decimal form is the wait token
    version: watch::Sender<u64>,
    calls: [AtomicUsize; 6],
    gets_in_flight: AtomicUsize,
    max_gets_in_flight: AtomicUsize,
}

/// Decrements the in-flight counter even when the call future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Backend with no ambient credentials
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self {
            default_project: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
            version,
            calls: Default::default(),
            gets_in_flight: AtomicUsize::new(0),
            max_gets_in_flight: AtomicUsize::new(0),
        }
    }

    /// Project returned by `authorize` when no key file is given
    pub fn with_project(mut self, project_id: impl Into<ProjectId>) -> Self {
        self.default_project = Some(project_id.into());
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Artificial delay applied to every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn add_debuggee(&self, debuggee: Debuggee) {
        let mut state = self.state.lock();
        state.breakpoints.entry(debuggee.id.clone()).or_default();
        state.debuggees.push(debuggee);
    }

    /// Agent side: the breakpoint fired and captured `frames`
    ///
    /// Returns the final breakpoint, or `None` if it does not exist.
    pub fn capture(&self, debuggee_id: &str, breakpoint_id: &str, frames: Vec<StackFrame>) -> Option<Breakpoint> {
        let mut state = self.state.lock();
        let bp = state.breakpoints.get_mut(debuggee_id)?.get_mut(breakpoint_id)?;
        bp.is_final_state = true;
        bp.stack_frames = frames;
        bp.final_time = Some(Utc::now());
        let captured = bp.clone();
        self.bump();

        debug!("Captured breakpoint {} on {}", breakpoint_id, debuggee_id);
        Some(captured)
    }

    /// Another client deleted the breakpoint
    pub fn delete_external(&self, debuggee_id: &str, breakpoint_id: &str) -> bool {
        let mut state = self.state.lock();
        let Some(bp) = state
            .breakpoints
            .get_mut(debuggee_id)
            .and_then(|bps| bps.remove(breakpoint_id))
        else {
            return false;
        };

        state
            .removed
            .entry(debuggee_id.to_string())
            .or_default()
            .insert(bp.id.clone(), bp);
        self.bump();
        true
    }

    /// Another client created a breakpoint on the same debuggee
    pub fn insert_foreign(
        &self,
        debuggee_id: &str,
        request: &BreakpointRequest,
        user_email: &str,
    ) -> BackendResult<Breakpoint> {
        let mut state = self.state.lock();
        let mut bp = new_breakpoint(request);
        bp.user_email = Some(user_email.to_string());
        state.debuggee_breakpoints(debuggee_id)?.insert(bp.id.clone(), bp.clone());
        self.bump();
        Ok(bp)
    }

    /// Store a breakpoint exactly as given, bypassing any checks
    pub fn upsert_raw(&self, debuggee_id: &str, bp: Breakpoint) {
        let mut state = self.state.lock();
        state
            .breakpoints
            .entry(debuggee_id.to_string())
            .or_default()
            .insert(bp.id.clone(), bp);
        self.bump();
    }

    /// Current server-side state of a breakpoint (does not count as a call)
    pub fn peek(&self, debuggee_id: &str, breakpoint_id: &str) -> Option<Breakpoint> {
        self.state
            .lock()
            .breakpoints
            .get(debuggee_id)
            .and_then(|bps| bps.get(breakpoint_id))
            .cloned()
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: Op, error: BackendError) {
        self.state.lock().failures.push_back((op, error));
    }

    /// Answer the next `count` list calls with [`BackendError::Aborted`]
    pub fn abort_next_lists(&self, count: usize) {
        self.state.lock().pending_aborts += count;
    }

    /// Number of calls made for `op` (including failed ones)
    pub fn calls(&self, op: Op) -> usize {
        self.calls[op as usize].load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously outstanding `get_breakpoint` calls
    pub fn max_concurrent_gets(&self) -> usize {
        self.max_gets_in_flight.load(Ordering::SeqCst)
    }

    /// Ids passed to successful `delete_breakpoint` calls, in call order
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// Current wait token
    pub fn wait_token(&self) -> String {
        self.version.borrow().to_string()
    }

    /// Must be called with the state lock held so tokens match contents
    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    async fn enter(&self, op: Op) -> BackendResult<()> {
        self.calls[op as usize].fetch_add(1, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock();
        if let Some(pos) = state.failures.iter().position(|(o, _)| *o == op) {
            if let Some((_, error)) = state.failures.remove(pos) {
                trace!("Injected failure for {:?}: {}", op, error);
                return Err(error);
            }
        }
        Ok(())
    }
}

fn new_breakpoint(request: &BreakpointRequest) -> Breakpoint {
    let mut bp = Breakpoint::from_request(Ulid::new().to_string(), request);
    bp.create_time = Some(Utc::now());
    bp
}

#[async_trait]
impl DebugBackend for MemoryBackend {
    async fn authorize(&self, key_file: Option<&Path>) -> BackendResult<ProjectId> {
        self.enter(Op::Authorize).await?;

        let project = match key_file {
            Some(path) => {
                let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                    BackendError::Unauthorized(format!("cannot read key file {}: {}", path.display(), e))
                })?;
                let key: KeyFile = serde_json::from_str(&contents)
                    .map_err(|e| BackendError::Unauthorized(format!("malformed key file: {}", e)))?;
                key.project_id
            }
            None => self.default_project.clone(),
        };

        match project {
            Some(project) if !project.is_empty() => Ok(project),
            _ => Err(BackendError::Unauthorized("no project id could be resolved".to_string())),
        }
    }

    async fn list_debuggees(&self, project_id: &str) -> BackendResult<Vec<Debuggee>> {
        self.enter(Op::ListDebuggees).await?;

        let state = self.state.lock();
        Ok(state
            .debuggees
            .iter()
            .filter(|d| d.project_id() == Some(project_id))
            .cloned()
            .collect())
    }

    async fn list_breakpoints(
        &self,
        debuggee_id: &str,
        wait_token: &str,
    ) -> BackendResult<ListBreakpointsResponse> {
        self.enter(Op::ListBreakpoints).await?;

        {
            let mut state = self.state.lock();
            if state.pending_aborts > 0 {
                state.pending_aborts -= 1;
                return Err(BackendError::Aborted);
            }
            state.debuggee_breakpoints(debuggee_id)?;
        }

        let mut rx = self.version.subscribe();
        let current = *rx.borrow_and_update();
        if !wait_token.is_empty() && wait_token.parse::<u64>().ok() == Some(current) {
            trace!("Long poll on {} at token {}", debuggee_id, wait_token);
            match tokio::time::timeout(self.poll_timeout, rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => return Err(BackendError::Aborted),
            }
        }

        let mut state = self.state.lock();
        let breakpoints = state
            .debuggee_breakpoints(debuggee_id)?
            .values()
            .filter(|bp| !bp.is_final_state)
            .cloned()
            .collect();

        Ok(ListBreakpointsResponse {
            breakpoints,
            next_wait_token: self.version.borrow().to_string(),
        })
    }

    async fn get_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> BackendResult<Breakpoint> {
        let in_flight = self.gets_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_gets_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        let _guard = InFlight(&self.gets_in_flight);

        self.enter(Op::GetBreakpoint).await?;

        let mut state = self.state.lock();
        if let Some(bp) = state.debuggee_breakpoints(debuggee_id)?.get(breakpoint_id) {
            return Ok(bp.clone());
        }
        state
            .removed
            .get(debuggee_id)
            .and_then(|bps| bps.get(breakpoint_id))
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("breakpoint {}", breakpoint_id)))
    }

    async fn set_breakpoint(
        &self,
        debuggee_id: &str,
        request: &BreakpointRequest,
    ) -> BackendResult<Breakpoint> {
        self.enter(Op::SetBreakpoint).await?;

        let mut state = self.state.lock();
        let bp = new_breakpoint(request);
        state.debuggee_breakpoints(debuggee_id)?.insert(bp.id.clone(), bp.clone());
        self.bump();

        debug!("Set breakpoint {} at {}", bp.id, bp.location);
        Ok(bp)
    }

    async fn delete_breakpoint(&self, debuggee_id: &str, breakpoint_id: &str) -> BackendResult<()> {
        self.enter(Op::DeleteBreakpoint).await?;

        let mut state = self.state.lock();
        let live = state.debuggee_breakpoints(debuggee_id)?.remove(breakpoint_id).is_some();
        let tombstone = !live
            && state
                .removed
                .get_mut(debuggee_id)
                .and_then(|bps| bps.remove(breakpoint_id))
                .is_some();
        if !live && !tombstone {
            return Err(BackendError::NotFound(format!("breakpoint {}", breakpoint_id)));
        }
        state.deleted.push(breakpoint_id.to_string());
        self.bump();
        Ok(())
    }
}
