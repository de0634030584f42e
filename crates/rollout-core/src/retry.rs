//! Fixed-interval retry state machine for a single step.
//!
//! ```text
//! Delaying -> Armed -> Executing -> Succeeded
//!               ^          |
//!               |          +-----> Failed      (no attempts left)
//!               |          |
//!               +- Retrying <-+                (attempts left)
//! ```
//!
//! The machine only tracks phases and the attempt budget. Timers, hooks and
//! status writes belong to the executor driving it.

use crate::step::RetryPolicy;
use std::time::Duration;

/// Phase of a step's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting out the start delay.
    Delaying,
    /// Timer set, waiting for the next fire.
    Armed,
    /// Work is running.
    Executing,
    /// Last attempt failed, attempts remain.
    Retrying,
    /// An attempt succeeded.
    Succeeded,
    /// The last attempt failed and none remain.
    Failed,
}

impl Phase {
    /// Returns `true` for `Succeeded` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::Failed)
    }
}

/// What the executor must do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run the success hook and complete the step.
    Succeeded,
    /// Re-arm the timer for another `interval`.
    Retry { remaining: u32, interval: Duration },
    /// Stop the timer, run the error hook and complete the step.
    Exhausted,
}

/// Phase and attempt budget of one step, driven by the executor.
#[derive(Debug, Clone)]
pub struct RetryMachine {
    policy: RetryPolicy,
    phase: Phase,
    remaining: u32,
    attempts: u32,
}

impl RetryMachine {
    /// Creates a machine in `Delaying` with the full attempt budget.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            phase: Phase::Delaying,
            remaining: policy.max_attempts(),
            attempts: 0,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Attempts still available, including the one about to run.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Interval to wait before the next fire.
    pub fn interval(&self) -> Duration {
        self.policy.interval()
    }

    /// `Delaying`/`Retrying` -> `Armed`. Returns `false` from any other phase.
    pub fn arm(&mut self) -> bool {
        match self.phase {
            Phase::Delaying | Phase::Retrying => {
                self.phase = Phase::Armed;
                true
            }
            _ => false,
        }
    }

    /// `Armed` -> `Executing`. Returns `false` from any other phase.
    pub fn begin_attempt(&mut self) -> bool {
        if self.phase != Phase::Armed {
            return false;
        }
        self.phase = Phase::Executing;
        self.attempts += 1;
        true
    }

    /// Applies the outcome of the running attempt.
    ///
    /// Returns `None` when no attempt is executing.
    pub fn complete_attempt<E>(&mut self, outcome: &Result<(), E>) -> Option<Transition> {
        if self.phase != Phase::Executing {
            return None;
        }

        if outcome.is_ok() {
            self.phase = Phase::Succeeded;
            return Some(Transition::Succeeded);
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.phase = Phase::Failed;
            Some(Transition::Exhausted)
        } else {
            self.phase = Phase::Retrying;
            Some(Transition::Retry {
                remaining: self.remaining,
                interval: self.policy.interval(),
            })
        }
    }
}
