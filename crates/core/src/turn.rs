//! In-flight Turn Tracking
//!
//! A conversation turn moves through a fixed sequence of states. The
//! [`TurnTracker`] holds the state of every turn currently running, keyed by
//! conversation, and refuses to start a second turn for a conversation that
//! already has one in flight.

use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle of one user turn.
///
/// `Idle → AwaitingCritiqueAndPersist → AwaitingReply → Settled`, with
/// `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    AwaitingCritiqueAndPersist,
    AwaitingReply,
    Settled,
    Failed,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Settled | TurnState::Failed)
    }

    /// Whether `self → next` is a legal step.
    pub fn can_advance_to(self, next: TurnState) -> bool {
        use TurnState::*;
        match (self, next) {
            (Idle, AwaitingCritiqueAndPersist) => true,
            (AwaitingCritiqueAndPersist, AwaitingReply) => true,
            (AwaitingReply, Settled) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TurnState::Idle => "idle",
            TurnState::AwaitingCritiqueAndPersist => "awaiting_critique_and_persist",
            TurnState::AwaitingReply => "awaiting_reply",
            TurnState::Settled => "settled",
            TurnState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnTrackingError {
    #[error("a turn is already in flight for conversation {0}")]
    AlreadyInFlight(Uuid),
    #[error("illegal turn transition from {from} to {to}")]
    IllegalTransition { from: TurnState, to: TurnState },
}

type TurnMap = HashMap<Uuid, TurnState>;

/// Registry of turns currently running, one slot per conversation.
#[derive(Debug, Clone, Default)]
pub struct TurnTracker {
    turns: Arc<Mutex<TurnMap>>,
}

impl TurnTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, TurnMap> {
        // A panic while holding this lock cannot leave the map inconsistent.
        self.turns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claims the slot for `conversation_id`, starting a turn in `Idle`.
    pub fn begin(&self, conversation_id: Uuid) -> Result<TurnGuard, TurnTrackingError> {
        let mut turns = self.lock();
        if turns.contains_key(&conversation_id) {
            return Err(TurnTrackingError::AlreadyInFlight(conversation_id));
        }
        turns.insert(conversation_id, TurnState::Idle);
        debug!(%conversation_id, "Turn slot claimed");
        Ok(TurnGuard {
            tracker: self.clone(),
            conversation_id,
            state: TurnState::Idle,
        })
    }

    /// Current state for a conversation; `Idle` when nothing is running.
    pub fn state(&self, conversation_id: Uuid) -> TurnState {
        self.lock()
            .get(&conversation_id)
            .copied()
            .unwrap_or(TurnState::Idle)
    }

    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }
}

/// Owns a conversation's turn slot; the slot is released on drop.
#[derive(Debug)]
pub struct TurnGuard {
    tracker: TurnTracker,
    conversation_id: Uuid,
    state: TurnState,
}

impl TurnGuard {
    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Moves the turn to `next`, rejecting out-of-order steps.
    pub fn advance(&mut self, next: TurnState) -> Result<(), TurnTrackingError> {
        if !self.state.can_advance_to(next) {
            return Err(TurnTrackingError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        self.tracker.lock().insert(self.conversation_id, next);
        debug!(conversation_id = %self.conversation_id, state = %next, "Turn advanced");
        Ok(())
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            warn!(
                conversation_id = %self.conversation_id,
                state = %self.state,
                "Turn abandoned before settling"
            );
        }
        self.tracker.lock().remove(&self.conversation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use TurnState::*;
        assert!(Idle.can_advance_to(AwaitingCritiqueAndPersist));
        assert!(AwaitingCritiqueAndPersist.can_advance_to(AwaitingReply));
        assert!(AwaitingReply.can_advance_to(Settled));
    }

    #[test]
    fn test_illegal_transitions() {
        use TurnState::*;
        assert!(!Idle.can_advance_to(AwaitingReply));
        assert!(!Idle.can_advance_to(Settled));
        assert!(!AwaitingReply.can_advance_to(AwaitingCritiqueAndPersist));
        assert!(!Settled.can_advance_to(Failed));
        assert!(!Failed.can_advance_to(Settled));
    }

    #[test]
    fn test_failure_from_any_live_state() {
        use TurnState::*;
        for state in [Idle, AwaitingCritiqueAndPersist, AwaitingReply] {
            assert!(state.can_advance_to(Failed), "{state} should be able to fail");
        }
    }

    #[test]
    fn test_second_turn_is_rejected_while_first_runs() {
        let tracker = TurnTracker::new();
        let id = Uuid::new_v4();

        let _first = tracker.begin(id).unwrap();
        assert_eq!(
            tracker.begin(id).unwrap_err(),
            TurnTrackingError::AlreadyInFlight(id)
        );

        // Other conversations are unaffected.
        assert!(tracker.begin(Uuid::new_v4()).is_ok());
    }

    #[test]
    fn test_dropping_guard_frees_slot() {
        let tracker = TurnTracker::new();
        let id = Uuid::new_v4();

        {
            let mut guard = tracker.begin(id).unwrap();
            guard.advance(TurnState::AwaitingCritiqueAndPersist).unwrap();
            assert_eq!(tracker.state(id), TurnState::AwaitingCritiqueAndPersist);
            assert_eq!(tracker.in_flight(), 1);
        }

        assert_eq!(tracker.state(id), TurnState::Idle);
        assert_eq!(tracker.in_flight(), 0);
        assert!(tracker.begin(id).is_ok());
    }

    #[test]
    fn test_guard_rejects_skipping_states() {
        let tracker = TurnTracker::new();
        let mut guard = tracker.begin(Uuid::new_v4()).unwrap();

        let err = guard.advance(TurnState::Settled).unwrap_err();
        assert_eq!(
            err,
            TurnTrackingError::IllegalTransition {
                from: TurnState::Idle,
                to: TurnState::Settled
            }
        );
        assert_eq!(guard.state(), TurnState::Idle);
    }

    #[test]
    fn test_full_turn() {
        let tracker = TurnTracker::new();
        let mut guard = tracker.begin(Uuid::new_v4()).unwrap();
        guard.advance(TurnState::AwaitingCritiqueAndPersist).unwrap();
        guard.advance(TurnState::AwaitingReply).unwrap();
        guard.advance(TurnState::Settled).unwrap();
        assert!(guard.state().is_terminal());
    }
}
