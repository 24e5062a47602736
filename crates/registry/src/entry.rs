//! Registry entry data structures

use serde::{Deserialize, Serialize};
use stakeout_core::Breakpoint;

/// Last known state of an owned breakpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitState {
    /// Not yet triggered
    Pending,
    /// Reached its final state (snapshot captured)
    Hit,
}

impl HitState {
    pub fn is_hit(self) -> bool {
        self == HitState::Hit
    }
}

impl std::fmt::Display for HitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HitState::Pending => f.write_str("pending"),
            HitState::Hit => f.write_str("hit"),
        }
    }
}

/// An owned breakpoint and its last known server snapshot
///
/// The state only moves forward: a `Hit` entry never becomes `Pending` again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointInfo {
    state: HitState,
    breakpoint: Breakpoint,
}

impl BreakpointInfo {
    /// New entry for a freshly created breakpoint
    pub fn pending(breakpoint: Breakpoint) -> Self {
        Self {
            state: HitState::Pending,
            breakpoint,
        }
    }

    pub fn id(&self) -> &str {
        &self.breakpoint.id
    }

    pub fn path(&self) -> &str {
        self.breakpoint.path()
    }

    pub fn state(&self) -> HitState {
        self.state
    }

    pub fn is_hit(&self) -> bool {
        self.state.is_hit()
    }

    pub fn breakpoint(&self) -> &Breakpoint {
        &self.breakpoint
    }

    pub fn into_breakpoint(self) -> Breakpoint {
        self.breakpoint
    }

    pub(crate) fn set_hit(&mut self, breakpoint: Breakpoint) {
        self.state = HitState::Hit;
        self.breakpoint = breakpoint;
    }

    pub(crate) fn set_snapshot(&mut self, breakpoint: Breakpoint) {
        self.breakpoint = breakpoint;
    }
}
