//! Output lifecycle states

use serde::Serialize;
use std::fmt;

/// Lifecycle state of an output instance
///
/// Declaration order is the required transition order; states only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Unconfigured,
    Configured,
    Started,
    Stopped,
    BeforeShutdown,
    Shutdown,
    AfterShutdown,
    Closed,
    Terminated,
}

impl LifecycleState {
    /// All states in transition order
    pub const ALL: [LifecycleState; 9] = [
        Self::Unconfigured,
        Self::Configured,
        Self::Started,
        Self::Stopped,
        Self::BeforeShutdown,
        Self::Shutdown,
        Self::AfterShutdown,
        Self::Closed,
        Self::Terminated,
    ];

    /// Successor state, `None` once terminated
    pub fn next(self) -> Option<Self> {
        let idx = self as usize;
        Self::ALL.get(idx + 1).copied()
    }

    /// Emission is permitted only while started
    #[inline]
    pub fn accepts_events(self) -> bool {
        self == Self::Started
    }

    /// Part of the teardown sequence (stopped and later)
    #[inline]
    pub fn is_teardown(self) -> bool {
        self >= Self::Stopped
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Configured => "configured",
            Self::Started => "started",
            Self::Stopped => "stopped",
            Self::BeforeShutdown => "before_shutdown",
            Self::Shutdown => "shutdown",
            Self::AfterShutdown => "after_shutdown",
            Self::Closed => "closed",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_walks_in_order() {
        let mut walked = vec![LifecycleState::Unconfigured];
        while let Some(next) = walked.last().and_then(|s| s.next()) {
            walked.push(next);
        }
        assert_eq!(walked, LifecycleState::ALL.to_vec());
        assert_eq!(LifecycleState::Terminated.next(), None);
    }

    #[test]
    fn test_only_started_accepts_events() {
        for state in LifecycleState::ALL {
            assert_eq!(state.accepts_events(), state == LifecycleState::Started);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(LifecycleState::BeforeShutdown.to_string(), "before_shutdown");
        assert_eq!(LifecycleState::Stopped.to_string(), "stopped");
    }
}
