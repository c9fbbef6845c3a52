//! Reconnect state machine.
//!
//! # Valid Transitions
//!
//! - Idle → AttemptingPrimary(1) | Succeeded(PriorityLink)
//! - AttemptingPrimary(n) → AttemptingPrimary(n + 1) | AttemptingFallback | Succeeded
//! - AttemptingFallback → Succeeded | Exhausted
//! - Succeeded | Exhausted → Idle (next cycle)
//! - AttemptingPrimary | AttemptingFallback → Idle (cancelled)
//!
//! # Examples
//!
//! ```
//! use serialink_network::{ReconnectMachine, ReconnectState, SuccessVia};
//!
//! let mut machine = ReconnectMachine::new();
//! machine.transition_to(ReconnectState::AttemptingPrimary { attempt: 1 }).unwrap();
//! machine.transition_to(ReconnectState::Succeeded(SuccessVia::Primary)).unwrap();
//!
//! assert!(machine.current_state().is_terminal());
//! assert!(machine.transition_to(ReconnectState::AttemptingFallback).is_err());
//! ```

use crate::error::NetworkError;
use serde::{Deserialize, Serialize};
use serialink_core::constants::MAX_RECONNECT_HISTORY;
use std::collections::VecDeque;
use std::fmt;
use tokio::time::Instant;

/// What ended a reconnect cycle successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessVia {
    /// A wired or cellular link already provides connectivity.
    PriorityLink,

    /// Joined the primary network.
    Primary,

    /// Joined the fallback network.
    Fallback,
}

impl fmt::Display for SuccessVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuccessVia::PriorityLink => write!(f, "priority link"),
            SuccessVia::Primary => write!(f, "primary"),
            SuccessVia::Fallback => write!(f, "fallback"),
        }
    }
}

/// Phase of a reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconnectState {
    /// No cycle running.
    #[default]
    Idle,

    /// Trying the primary network, `attempt` counts from 1.
    AttemptingPrimary { attempt: u32 },

    /// Primary attempts exhausted, trying the fallback once.
    AttemptingFallback,

    /// Connectivity restored.
    Succeeded(SuccessVia),

    /// Both targets failed. Terminal for the cycle.
    Exhausted,
}

impl fmt::Display for ReconnectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconnectState::Idle => write!(f, "Idle"),
            ReconnectState::AttemptingPrimary { attempt } => {
                write!(f, "AttemptingPrimary({})", attempt)
            }
            ReconnectState::AttemptingFallback => write!(f, "AttemptingFallback"),
            ReconnectState::Succeeded(via) => write!(f, "Succeeded({})", via),
            ReconnectState::Exhausted => write!(f, "Exhausted"),
        }
    }
}

impl ReconnectState {
    /// Check if transition to `target` is valid from this state.
    ///
    /// ```
    /// use serialink_network::{ReconnectState, SuccessVia};
    ///
    /// let idle = ReconnectState::Idle;
    /// assert!(idle.can_transition_to(&ReconnectState::AttemptingPrimary { attempt: 1 }));
    /// assert!(idle.can_transition_to(&ReconnectState::Succeeded(SuccessVia::PriorityLink)));
    /// assert!(!idle.can_transition_to(&ReconnectState::AttemptingFallback));
    /// ```
    pub fn can_transition_to(&self, target: &ReconnectState) -> bool {
        use ReconnectState::*;

        match (self, target) {
            (Idle, AttemptingPrimary { attempt }) => *attempt == 1,
            (Idle, Succeeded(SuccessVia::PriorityLink)) => true,
            (AttemptingPrimary { attempt: current }, AttemptingPrimary { attempt: next }) => {
                *next == current + 1
            }
            (AttemptingPrimary { .. }, AttemptingFallback) => true,
            (AttemptingPrimary { .. }, Succeeded(SuccessVia::Primary | SuccessVia::PriorityLink)) => {
                true
            }
            (AttemptingFallback, Succeeded(SuccessVia::Fallback | SuccessVia::PriorityLink)) => true,
            (AttemptingFallback, Exhausted) => true,
            (AttemptingPrimary { .. } | AttemptingFallback, Idle) => true,
            (Succeeded(_) | Exhausted, Idle) => true,
            _ => false,
        }
    }

    /// Check if a reconnect attempt is in flight.
    pub fn is_attempting(&self) -> bool {
        matches!(
            self,
            ReconnectState::AttemptingPrimary { .. } | ReconnectState::AttemptingFallback
        )
    }

    /// Check if the cycle has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconnectState::Succeeded(_) | ReconnectState::Exhausted)
    }
}

/// A recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    /// The state transitioned from.
    pub from: ReconnectState,

    /// The state transitioned to.
    pub to: ReconnectState,

    /// When the transition occurred.
    pub timestamp: Instant,
}

impl StateTransition {
    fn new(from: ReconnectState, to: ReconnectState) -> Self {
        Self {
            from,
            to,
            timestamp: Instant::now(),
        }
    }
}

/// Validating reconnect state machine with a bounded transition history.
///
/// Timestamps come from the Tokio clock, so a paused test runtime controls
/// them.
#[derive(Debug)]
pub struct ReconnectMachine {
    current_state: ReconnectState,
    history: VecDeque<StateTransition>,
}

impl ReconnectMachine {
    /// Create a machine in the `Idle` state.
    pub fn new() -> Self {
        Self {
            current_state: ReconnectState::Idle,
            history: VecDeque::with_capacity(MAX_RECONNECT_HISTORY),
        }
    }

    /// Get the current state of the machine.
    pub fn current_state(&self) -> &ReconnectState {
        &self.current_state
    }

    /// Recent transitions, oldest first.
    pub fn history(&self) -> &VecDeque<StateTransition> {
        &self.history
    }

    /// Transition to `new_state`, rejecting moves the state graph forbids.
    pub fn transition_to(
        &mut self,
        new_state: ReconnectState,
    ) -> Result<StateTransition, NetworkError> {
        if !self.current_state.can_transition_to(&new_state) {
            return Err(NetworkError::InvalidTransition {
                from: self.current_state,
                to: new_state,
            });
        }

        let transition = StateTransition::new(self.current_state, new_state);
        self.current_state = new_state;
        self.history.push_back(transition);
        if self.history.len() > MAX_RECONNECT_HISTORY {
            self.history.pop_front();
        }

        Ok(transition)
    }
}

impl Default for ReconnectMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ReconnectState::*;

    #[rstest]
    #[case(Idle, AttemptingPrimary { attempt: 1 }, true)]
    #[case(Idle, AttemptingPrimary { attempt: 2 }, false)]
    #[case(Idle, Succeeded(SuccessVia::PriorityLink), true)]
    #[case(Idle, Succeeded(SuccessVia::Primary), false)]
    #[case(Idle, Exhausted, false)]
    #[case(AttemptingPrimary { attempt: 2 }, AttemptingPrimary { attempt: 3 }, true)]
    #[case(AttemptingPrimary { attempt: 2 }, AttemptingPrimary { attempt: 2 }, false)]
    #[case(AttemptingPrimary { attempt: 5 }, AttemptingFallback, true)]
    #[case(AttemptingPrimary { attempt: 1 }, Succeeded(SuccessVia::Primary), true)]
    #[case(AttemptingPrimary { attempt: 1 }, Succeeded(SuccessVia::Fallback), false)]
    #[case(AttemptingPrimary { attempt: 1 }, Exhausted, false)]
    #[case(AttemptingFallback, Succeeded(SuccessVia::Fallback), true)]
    #[case(AttemptingFallback, Succeeded(SuccessVia::PriorityLink), true)]
    #[case(AttemptingFallback, Exhausted, true)]
    #[case(AttemptingFallback, AttemptingPrimary { attempt: 1 }, false)]
    #[case(Exhausted, Idle, true)]
    #[case(Exhausted, AttemptingFallback, false)]
    #[case(Succeeded(SuccessVia::Primary), Idle, true)]
    fn test_transition_rules(
        #[case] from: ReconnectState,
        #[case] to: ReconnectState,
        #[case] valid: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), valid);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut machine = ReconnectMachine::new();

        let err = machine.transition_to(Exhausted).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::InvalidTransition {
                from: Idle,
                to: Exhausted
            }
        ));
        assert_eq!(machine.current_state(), &Idle);
        assert!(machine.history().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let mut machine = ReconnectMachine::new();

        for _ in 0..(MAX_RECONNECT_HISTORY + 10) {
            machine.transition_to(Succeeded(SuccessVia::PriorityLink)).unwrap();
            machine.transition_to(Idle).unwrap();
        }

        assert_eq!(machine.history().len(), MAX_RECONNECT_HISTORY);
        assert_eq!(machine.history().back().map(|t| t.to), Some(Idle));
    }

    #[test]
    fn test_display() {
        assert_eq!(AttemptingPrimary { attempt: 3 }.to_string(), "AttemptingPrimary(3)");
        assert_eq!(
            Succeeded(SuccessVia::PriorityLink).to_string(),
            "Succeeded(priority link)"
        );
    }

    #[test]
    fn test_state_predicates() {
        assert!(AttemptingFallback.is_attempting());
        assert!(!Idle.is_attempting());
        assert!(Exhausted.is_terminal());
        assert!(!AttemptingPrimary { attempt: 1 }.is_terminal());
    }
}
