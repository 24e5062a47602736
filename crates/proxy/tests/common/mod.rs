//! Scripted backend for reconciliation tests
//!
//! List responses are queued explicitly; `get_breakpoint` answers from a
//! map the test controls. Every call is recorded.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use proxy::{DebugProxy, ProxyConfig};
use stakeout_core::{
    BackendError, BackendResult, Breakpoint, BreakpointRequest, DebugBackend, Debuggee,
    ListBreakpointsResponse, SourceLocation, StackFrame,
};
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

#[derive(Default)]
struct Script {
    lists: VecDeque<BackendResult<ListBreakpointsResponse>>,
    remote: HashMap<String, Breakpoint>,
    get_failures: HashMap<String, BackendError>,
    delete_failures: HashMap<String, BackendError>,
    next_id: usize,
    tokens: Vec<String>,
    gets: Vec<String>,
    deletes: Vec<String>,
}

#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<Script>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a successful list answer with the given remote ids
    pub fn push_list(&self, ids: &[&str], next_token: &str) {
        let mut script = self.script.lock();
        let breakpoints = ids
            .iter()
            .map(|id| {
                script
                    .remote
                    .get(*id)
                    .cloned()
                    .unwrap_or_else(|| snapshot_bp(id, "/other.js", 1))
            })
            .collect();
        script.lists.push_back(Ok(ListBreakpointsResponse {
            breakpoints,
            next_wait_token: next_token.to_string(),
        }));
    }

    pub fn push_list_raw(&self, response: ListBreakpointsResponse) {
        self.script.lock().lists.push_back(Ok(response));
    }

    pub fn push_list_error(&self, error: BackendError) {
        self.script.lock().lists.push_back(Err(error));
    }

    /// Server-side copy returned by `get_breakpoint`
    pub fn set_remote(&self, bp: Breakpoint) {
        self.script.lock().remote.insert(bp.id.clone(), bp);
    }

    pub fn remote(&self, id: &str) -> Option<Breakpoint> {
        self.script.lock().remote.get(id).cloned()
    }

    /// Mark the server copy final with one captured frame
    pub fn finalize(&self, id: &str) -> Breakpoint {
        let mut script = self.script.lock();
        let bp = script.remote.get_mut(id).expect("unknown breakpoint");
        bp.is_final_state = true;
        bp.stack_frames = vec![StackFrame {
            function: "handler".to_string(),
            location: bp.location.clone(),
            arguments: Vec::new(),
            locals: Vec::new(),
        }];
        bp.clone()
    }

    pub fn fail_get(&self, id: &str, error: BackendError) {
        self.script.lock().get_failures.insert(id.to_string(), error);
    }

    pub fn fail_delete(&self, id: &str, error: BackendError) {
        self.script.lock().delete_failures.insert(id.to_string(), error);
    }

    pub fn tokens(&self) -> Vec<String> {
        self.script.lock().tokens.clone()
    }

    pub fn gets(&self) -> Vec<String> {
        self.script.lock().gets.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.script.lock().deletes.clone()
    }
}

#[async_trait]
impl DebugBackend for ScriptedBackend {
    async fn authorize(&self, _key_file: Option<&Path>) -> BackendResult<String> {
        Ok("proj".to_string())
    }

    async fn list_debuggees(&self, project_id: &str) -> BackendResult<Vec<Debuggee>> {
        Ok(vec![Debuggee::new("d1", project_id, "v1")])
    }

    async fn list_breakpoints(
        &self,
        _debuggee_id: &str,
        wait_token: &str,
    ) -> BackendResult<ListBreakpointsResponse> {
        let mut script = self.script.lock();
        script.tokens.push(wait_token.to_string());
        script
            .lists
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Transport("no scripted list response".to_string())))
    }

    async fn get_breakpoint(&self, _debuggee_id: &str, breakpoint_id: &str) -> BackendResult<Breakpoint> {
        let mut script = self.script.lock();
        script.gets.push(breakpoint_id.to_string());
        if let Some(error) = script.get_failures.remove(breakpoint_id) {
            return Err(error);
        }
        script
            .remote
            .get(breakpoint_id)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(breakpoint_id.to_string()))
    }

    async fn set_breakpoint(
        &self,
        _debuggee_id: &str,
        request: &BreakpointRequest,
    ) -> BackendResult<Breakpoint> {
        let mut script = self.script.lock();
        script.next_id += 1;
        let bp = Breakpoint::from_request(format!("b{}", script.next_id), request);
        script.remote.insert(bp.id.clone(), bp.clone());
        Ok(bp)
    }

    async fn delete_breakpoint(&self, _debuggee_id: &str, breakpoint_id: &str) -> BackendResult<()> {
        let mut script = self.script.lock();
        script.deletes.push(breakpoint_id.to_string());
        if let Some(error) = script.delete_failures.remove(breakpoint_id) {
            return Err(error);
        }
        script.remote.remove(breakpoint_id);
        Ok(())
    }
}

pub fn snapshot_bp(id: &str, path: &str, line: u32) -> Breakpoint {
    Breakpoint::from_request(id, &snapshot_at(path, line))
}

pub fn snapshot_at(path: &str, line: u32) -> BreakpointRequest {
    BreakpointRequest::snapshot(SourceLocation::new(path, line))
}

/// Proxy bound to debuggee `d1` with the given executor ceiling
pub fn proxy_for(backend: Arc<dyn DebugBackend>, concurrency: usize) -> DebugProxy {
    let config = ProxyConfig {
        project_id: Some("proj".to_string()),
        debuggee_id: Some("d1".to_string()),
        concurrency,
        ..ProxyConfig::default()
    };
    DebugProxy::from_config(backend, &config).unwrap()
}
