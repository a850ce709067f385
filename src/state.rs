//! Per-key refresh state and per-call outcomes.
//!
//! # Refresh lifecycle
//!
//! ```text
//!            arm / ensure_refresh
//!   Idle ─────────────────────────▶ Scheduled ──(ttl elapsed)──▶ Refreshing
//!    ▲                                  ▲                            │
//!    │ cancel / shutdown                └──────(fetch landed)────────┘
//!    └──────────────────────────────────────────────────────────────
//! ```
//!
//! A call only starts a background refresh when the key is `Idle`. Both
//! `Scheduled` and `Refreshing` mean someone is already responsible for the
//! key, so a stale reader during an in-flight refresh does not start a
//! second one.
//!
//! # Call outcomes
//!
//! | Outcome | Store | Scheduler | Fetcher |
//! |---------|-------|-----------|---------|
//! | **Hit** | value | Scheduled/Refreshing | not called |
//! | **Stale** | value | was Idle | called in background |
//! | **Miss** | absent | (armed afterwards) | called by this caller |

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Refresh state of one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RefreshState {
    /// No timer and no refresh in flight.
    #[default]
    Idle,
    /// Timer armed, waiting for the TTL window to elapse.
    Scheduled,
    /// Background fetch in flight.
    Refreshing,
}

impl RefreshState {
    fn to_u8(self) -> u8 {
        match self {
            RefreshState::Idle => 0,
            RefreshState::Scheduled => 1,
            RefreshState::Refreshing => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RefreshState::Scheduled,
            2 => RefreshState::Refreshing,
            _ => RefreshState::Idle,
        }
    }
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshState::Idle => write!(f, "Idle"),
            RefreshState::Scheduled => write!(f, "Scheduled"),
            RefreshState::Refreshing => write!(f, "Refreshing"),
        }
    }
}

/// Lock-free cell shared between a scheduler slot and its task.
#[derive(Debug, Default)]
pub(crate) struct AtomicRefreshState(AtomicU8);

impl AtomicRefreshState {
    pub(crate) fn new(state: RefreshState) -> Self {
        AtomicRefreshState(AtomicU8::new(state.to_u8()))
    }

    pub(crate) fn load(&self) -> RefreshState {
        RefreshState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: RefreshState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }
}

/// How a single call was served.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallOutcome {
    /// Served from cache; a refresh was already scheduled.
    Hit,
    /// Served from cache; this call started a background refresh.
    Stale,
    /// Not cached; the caller waited for the fetcher.
    Miss,
}

impl CallOutcome {
    /// Whether the value came from the cache.
    pub fn is_cached(&self) -> bool {
        !matches!(self, CallOutcome::Miss)
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallOutcome::Hit => write!(f, "Hit"),
            CallOutcome::Stale => write!(f, "Stale"),
            CallOutcome::Miss => write!(f, "Miss"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_state_display() {
        assert_eq!(RefreshState::Idle.to_string(), "Idle");
        assert_eq!(RefreshState::Scheduled.to_string(), "Scheduled");
        assert_eq!(RefreshState::Refreshing.to_string(), "Refreshing");
    }

    #[test]
    fn test_refresh_state_default() {
        assert_eq!(RefreshState::default(), RefreshState::Idle);
    }

    #[test]
    fn test_atomic_state_transitions() {
        let cell = AtomicRefreshState::new(RefreshState::Scheduled);
        assert_eq!(cell.load(), RefreshState::Scheduled);

        cell.store(RefreshState::Refreshing);
        assert_eq!(cell.load(), RefreshState::Refreshing);

        cell.store(RefreshState::Idle);
        assert_eq!(cell.load(), RefreshState::Idle);
    }

    #[test]
    fn test_call_outcome() {
        assert_eq!(CallOutcome::Stale.to_string(), "Stale");
        assert!(CallOutcome::Hit.is_cached());
        assert!(CallOutcome::Stale.is_cached());
        assert!(!CallOutcome::Miss.is_cached());
    }
}
