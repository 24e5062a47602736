//! Record of breakpoints owned by this proxy instance

use crate::entry::{BreakpointInfo, HitState};
use crate::Result;
use parking_lot::RwLock;
use stakeout_core::Breakpoint;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("breakpoint {0} is already registered")]
    Duplicate(String),

    #[error("breakpoint {0} is not registered")]
    Missing(String),

    /// A breakpoint already recorded as hit came back with different contents
    #[error("final breakpoint {0} changed on the server")]
    DivergentFinalState(String),

    /// A breakpoint already recorded as hit was reported pending again
    #[error("breakpoint {0} was hit but is reported pending again")]
    RegressedToPending(String),
}

/// Owned breakpoints keyed by id
///
/// All operations are synchronous and take the lock only for their own
/// duration; reads hand out copies, so iterating a snapshot is unaffected by
/// later mutation.
#[derive(Default)]
pub struct BreakpointRegistry {
    entries: RwLock<BTreeMap<String, BreakpointInfo>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entry under its breakpoint id
    pub fn insert(&self, info: BreakpointInfo) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(info.id()) {
            return Err(RegistryError::Duplicate(info.id().to_string()));
        }
        trace!("Registered breakpoint {}", info.id());
        entries.insert(info.id().to_string(), info);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<BreakpointInfo> {
        self.entries.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn remove(&self, id: &str) -> Option<BreakpointInfo> {
        self.entries.write().remove(id)
    }

    /// Remove an entry only while it is still pending
    pub fn remove_if_pending(&self, id: &str) -> Option<BreakpointInfo> {
        let mut entries = self.entries.write();
        match entries.get(id) {
            Some(info) if !info.is_hit() => entries.remove(id),
            _ => None,
        }
    }

    /// Remove every pending entry set on `path`; hit entries stay
    pub fn remove_pending_for_path(&self, path: &str) -> Vec<BreakpointInfo> {
        let mut entries = self.entries.write();
        let ids: Vec<String> = entries
            .values()
            .filter(|info| !info.is_hit() && info.path() == path)
            .map(|info| info.id().to_string())
            .collect();

        ids.iter().filter_map(|id| entries.remove(id)).collect()
    }

    /// Take every entry, leaving the registry empty
    pub fn drain(&self) -> Vec<BreakpointInfo> {
        std::mem::take(&mut *self.entries.write())
            .into_values()
            .collect()
    }

    /// Copy of all entries at this instant
    pub fn snapshot(&self) -> Vec<BreakpointInfo> {
        self.entries.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Last known breakpoints in the given state
    pub fn filter_by_state(&self, state: HitState) -> Vec<Breakpoint> {
        self.entries
            .read()
            .values()
            .filter(|info| info.state() == state)
            .map(|info| info.breakpoint().clone())
            .collect()
    }

    /// Record a final server snapshot
    ///
    /// Returns `true` when the entry transitioned from pending to hit, and
    /// `false` when it was already hit with an identical snapshot.
    pub fn mark_hit(&self, id: &str, breakpoint: Breakpoint) -> Result<bool> {
        let mut entries = self.entries.write();
        let info = entries
            .get_mut(id)
            .ok_or_else(|| RegistryError::Missing(id.to_string()))?;

        match info.state() {
            HitState::Pending => {
                info.set_hit(breakpoint);
                Ok(true)
            }
            HitState::Hit if *info.breakpoint() == breakpoint => Ok(false),
            HitState::Hit => Err(RegistryError::DivergentFinalState(id.to_string())),
        }
    }

    /// Replace the cached snapshot of a pending entry
    ///
    /// Returns `false` if the entry is gone.
    pub fn refresh(&self, id: &str, breakpoint: Breakpoint) -> Result<bool> {
        let mut entries = self.entries.write();
        match entries.get_mut(id) {
            None => Ok(false),
            Some(info) if info.is_hit() => Err(RegistryError::RegressedToPending(id.to_string())),
            Some(info) => {
                info.set_snapshot(breakpoint);
                Ok(true)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
