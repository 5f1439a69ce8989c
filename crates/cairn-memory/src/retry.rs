// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry-with-feedback policy for structured generation.
//!
//! [`RetryMachine`] is independent of any generation capability: callers
//! report what happened to the current attempt and read back the next
//! state. The number of transitions is bounded by `2 * max_attempts`, so a
//! driver loop over the machine always terminates.

/// State of a retry sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is in progress.
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed with a retryable reason; the next attempt
    /// should carry `reason` as feedback.
    RetryingWithFeedback { attempt: u32, reason: String },
    /// Attempt `attempts` succeeded.
    Succeeded { attempts: u32 },
    /// No more attempts will be made.
    Exhausted { attempts: u32, reason: String },
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RetryState::Succeeded { .. } | RetryState::Exhausted { .. })
    }
}

/// What happened to the current step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// The attempt produced a usable result.
    Succeeded,
    /// The attempt failed. Non-retryable failures exhaust immediately.
    Failed { reason: String, retryable: bool },
    /// The caller is about to start the next attempt.
    Resumed,
}

/// Bounded retry state machine.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    state: RetryState,
    max_attempts: u32,
    transitions: u32,
}

impl RetryMachine {
    /// Start at attempt 1. `max_attempts` is clamped to at least 1.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: RetryState::Attempting { attempt: 1 },
            max_attempts: max_attempts.max(1),
            transitions: 0,
        }
    }

    pub fn state(&self) -> &RetryState {
        &self.state
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Upper bound on [`transitions`](Self::transitions) before the machine
    /// forces [`RetryState::Exhausted`].
    pub fn max_transitions(&self) -> u32 {
        self.max_attempts.saturating_mul(2)
    }

    /// The current attempt number, whatever the state.
    pub fn attempt(&self) -> u32 {
        match &self.state {
            RetryState::Attempting { attempt } | RetryState::RetryingWithFeedback { attempt, .. } => {
                *attempt
            }
            RetryState::Succeeded { attempts } | RetryState::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// Feedback for the next attempt, when one is pending.
    pub fn feedback(&self) -> Option<&str> {
        match &self.state {
            RetryState::RetryingWithFeedback { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Apply an event and return the new state.
    ///
    /// Events that do not apply to the current state leave it unchanged but
    /// still count towards the transition bound. Terminal states absorb
    /// every event.
    pub fn apply(&mut self, event: RetryEvent) -> &RetryState {
        if self.state.is_terminal() {
            return &self.state;
        }

        let next = match (&self.state, event) {
            (RetryState::Attempting { attempt }, RetryEvent::Succeeded) => {
                RetryState::Succeeded { attempts: *attempt }
            }
            (RetryState::Attempting { attempt }, RetryEvent::Failed { reason, retryable })
                if !retryable || *attempt >= self.max_attempts =>
            {
                RetryState::Exhausted {
                    attempts: *attempt,
                    reason,
                }
            }
            (RetryState::Attempting { attempt }, RetryEvent::Failed { reason, .. }) => {
                RetryState::RetryingWithFeedback {
                    attempt: *attempt,
                    reason,
                }
            }
            (RetryState::RetryingWithFeedback { attempt, .. }, RetryEvent::Resumed) => {
                RetryState::Attempting {
                    attempt: attempt + 1,
                }
            }
            (state, _) => state.clone(),
        };

        self.transitions += 1;
        self.state = if !next.is_terminal() && self.transitions >= self.max_transitions() {
            RetryState::Exhausted {
                attempts: self.attempt(),
                reason: "retry transition bound reached".to_string(),
            }
        } else {
            next
        };
        &self.state
    }
}
