// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Snapshot state machine with typed state transitions.
//!
//! Implements the snapshot lifecycle: Unsaved → Saved. Saving is one-shot;
//! restores loop on `Saved` and are counted rather than modelled as
//! transitions. Invalid transitions result in StateTransitionError.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;

/// Snapshot lifecycle phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotPhase {
    /// No checkpoint has been committed; restore is rejected.
    Unsaved,

    /// A checkpoint is committed and can be restored any number of times.
    Saved,
}

impl SnapshotPhase {
    /// Get the phase name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unsaved => "Unsaved",
            Self::Saved => "Saved",
        }
    }

    /// Check if transition to the target phase is valid.
    pub fn can_transition_to(&self, target: SnapshotPhase) -> bool {
        matches!((self, target), (Self::Unsaved, Self::Saved))
    }
}

impl std::fmt::Display for SnapshotPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for the snapshot lifecycle.
/// Enforces valid transitions and tracks timing metrics.
#[derive(Debug)]
pub struct SnapshotStateMachine {
    current_phase: SnapshotPhase,
    last_transition: Instant,
    transition_count: u64,
    restore_count: u64,
    last_save: Option<Duration>,
    last_restore: Option<Duration>,
}

impl SnapshotStateMachine {
    /// Create a state machine in the `Unsaved` phase.
    pub fn new() -> Self {
        Self {
            current_phase: SnapshotPhase::Unsaved,
            last_transition: Instant::now(),
            transition_count: 0,
            restore_count: 0,
            last_save: None,
            last_restore: None,
        }
    }

    /// Get the current phase.
    pub fn phase(&self) -> SnapshotPhase {
        self.current_phase
    }

    /// Whether a checkpoint has been committed.
    pub fn is_saved(&self) -> bool {
        self.current_phase == SnapshotPhase::Saved
    }

    /// Get time since last transition.
    pub fn time_in_current_phase(&self) -> Duration {
        self.last_transition.elapsed()
    }

    /// Get total number of transitions.
    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Number of successful restores.
    pub fn restore_count(&self) -> u64 {
        self.restore_count
    }

    /// Duration of the committed save, if any.
    pub fn last_save(&self) -> Option<Duration> {
        self.last_save
    }

    /// Duration of the most recent successful restore.
    pub fn last_restore(&self) -> Option<Duration> {
        self.last_restore
    }

    /// Attempt to transition to a new phase.
    pub fn transition_to(&mut self, target: SnapshotPhase) -> Result<(), StateTransitionError> {
        if !self.current_phase.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.current_phase.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = self.current_phase.name(),
            to = target.name(),
            "Snapshot phase transition"
        );

        self.current_phase = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;

        Ok(())
    }

    /// Commit a save that took `elapsed`.
    pub fn commit_save(&mut self, elapsed: Duration) -> Result<(), StateTransitionError> {
        self.transition_to(SnapshotPhase::Saved)?;
        self.last_save = Some(elapsed);
        Ok(())
    }

    /// Record a successful restore that took `elapsed`.
    pub fn record_restore(&mut self, elapsed: Duration) {
        self.restore_count += 1;
        self.last_restore = Some(elapsed);
    }
}

impl Default for SnapshotStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let sm = SnapshotStateMachine::new();
        assert_eq!(sm.phase(), SnapshotPhase::Unsaved);
        assert!(!sm.is_saved());
        assert_eq!(sm.transition_count(), 0);
        assert_eq!(sm.restore_count(), 0);
    }

    #[test]
    fn test_save_is_one_shot() {
        let mut sm = SnapshotStateMachine::new();

        sm.commit_save(Duration::from_millis(3)).unwrap();
        assert!(sm.is_saved());
        assert_eq!(sm.last_save(), Some(Duration::from_millis(3)));
        assert_eq!(sm.transition_count(), 1);

        // Saved → Saved and Saved → Unsaved are both rejected.
        assert!(sm.transition_to(SnapshotPhase::Saved).is_err());
        assert!(sm.transition_to(SnapshotPhase::Unsaved).is_err());
        assert_eq!(sm.phase(), SnapshotPhase::Saved);
        assert_eq!(sm.transition_count(), 1);
    }

    #[test]
    fn test_restores_counted() {
        let mut sm = SnapshotStateMachine::new();
        sm.commit_save(Duration::ZERO).unwrap();
        for i in 1..=3 {
            sm.record_restore(Duration::from_micros(i));
        }
        assert_eq!(sm.restore_count(), 3);
        assert_eq!(sm.last_restore(), Some(Duration::from_micros(3)));
        assert_eq!(sm.phase(), SnapshotPhase::Saved);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(SnapshotPhase::Unsaved.to_string(), "Unsaved");
        assert_eq!(SnapshotPhase::Saved.to_string(), "Saved");
    }
}
