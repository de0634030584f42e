//! Per-step status records.

use crate::error::StepError;
use crate::step::StepName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

/// Execution state of a step.
///
/// `Pending` covers both "not reached yet" and "currently running"; the other
/// three are terminal and never change once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    #[default]
    Pending,
    Success,
    /// Attempts exhausted, the run carries on.
    SingleFailed,
    /// Attempts exhausted and the run was aborted.
    GlobalFailed,
}

impl StepState {
    /// Returns `true` for every state except `Pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepState::Pending)
    }

    /// Result message recorded for this state.
    pub fn result_message(&self, error: Option<&StepError>) -> String {
        let details = error.map(|e| e.to_string()).unwrap_or_default();
        match self {
            StepState::Pending | StepState::Success => String::new(),
            StepState::SingleFailed => format!("step failed: {details}"),
            StepState::GlobalFailed => format!("step failure aborted the run: {details}"),
        }
    }
}

/// Point-in-time copy of a step's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatus {
    /// Name the step was registered under.
    pub name: StepName,
    /// Current execution state.
    pub state: StepState,
    /// When the step's timer was armed (after its start delay).
    pub start_time: Option<DateTime<Utc>>,
    /// Set with the terminal state; always `start_time + duration`.
    pub end_time: Option<DateTime<Utc>>,
    /// Time from arming to the terminal state.
    pub duration: Option<Duration>,
    /// Empty on success, describes the last error on failure.
    pub result_message: String,
    /// Attempts made so far.
    pub attempts: u32,
}

impl StepStatus {
    /// Creates a pending status with no timestamps.
    pub fn new(name: StepName) -> Self {
        Self {
            name,
            state: StepState::Pending,
            start_time: None,
            end_time: None,
            duration: None,
            result_message: String::new(),
            attempts: 0,
        }
    }

    /// Returns `true` once the step reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Shared, engine-written status of one step.
///
/// Readers take snapshots at any time. Writes after the terminal transition
/// are ignored. Only the scheduler writes to it; callers read through
/// [`StepStatus`] snapshots.
#[doc(hidden)]
#[derive(Debug)]
pub struct StatusRecord {
    inner: RwLock<StepStatus>,
}

impl StatusRecord {
    /// Creates a pending record for `name`.
    pub fn new(name: StepName) -> Self {
        Self {
            inner: RwLock::new(StepStatus::new(name)),
        }
    }

    /// Copies the current status.
    pub fn snapshot(&self) -> StepStatus {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records when the step's timer was armed.
    pub fn mark_started(&self, at: DateTime<Utc>) {
        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !status.is_terminal() {
            status.start_time = Some(at);
        }
    }

    /// Counts one attempt and returns the new total.
    pub fn record_attempt(&self) -> u32 {
        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if !status.is_terminal() {
            status.attempts += 1;
        }
        status.attempts
    }

    /// Records the terminal transition.
    ///
    /// Returns `false` (and changes nothing) when the step already reached a
    /// terminal state or `state` is not terminal.
    pub fn finish(
        &self,
        state: StepState,
        error: Option<&StepError>,
        at: DateTime<Utc>,
        duration: Duration,
    ) -> bool {
        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if status.is_terminal() || !state.is_terminal() {
            return false;
        }
        status.end_time = Some(at);
        status.duration = Some(duration);
        status.result_message = state.result_message(error);
        status.state = state;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_messages() {
        let err = StepError::new("rollout timed out");
        assert_eq!(StepState::Success.result_message(None), "");
        assert_eq!(
            StepState::SingleFailed.result_message(Some(&err)),
            "step failed: rollout timed out"
        );
        assert_eq!(
            StepState::GlobalFailed.result_message(Some(&err)),
            "step failure aborted the run: rollout timed out"
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!StepState::Pending.is_terminal());
        assert!(StepState::Success.is_terminal());
        assert!(StepState::SingleFailed.is_terminal());
        assert!(StepState::GlobalFailed.is_terminal());
    }

    #[test]
    fn test_finish_is_write_once() {
        let record = StatusRecord::new(StepName::new("deploy"));
        let started = Utc::now();
        record.mark_started(started);

        assert!(record.finish(
            StepState::Success,
            None,
            Utc::now(),
            Duration::from_millis(5)
        ));
        assert!(!record.finish(
            StepState::SingleFailed,
            Some(&StepError::new("late")),
            Utc::now(),
            Duration::from_secs(1)
        ));

        let status = record.snapshot();
        assert_eq!(status.state, StepState::Success);
        assert_eq!(status.result_message, "");
        assert_eq!(status.duration, Some(Duration::from_millis(5)));
        assert_eq!(status.start_time, Some(started));
        assert!(status.end_time >= status.start_time);
    }

    #[test]
    fn test_finish_rejects_pending() {
        let record = StatusRecord::new(StepName::new("deploy"));
        assert!(!record.finish(StepState::Pending, None, Utc::now(), Duration::ZERO));
        assert_eq!(record.snapshot().end_time, None);
    }

    #[test]
    fn test_attempts_stop_counting_after_terminal() {
        let record = StatusRecord::new(StepName::new("probe"));
        assert_eq!(record.record_attempt(), 1);
        assert_eq!(record.record_attempt(), 2);
        record.finish(
            StepState::GlobalFailed,
            Some(&StepError::new("down")),
            Utc::now(),
            Duration::ZERO,
        );
        assert_eq!(record.record_attempt(), 2);
    }

    #[test]
    fn test_status_serializes_snake_case_state() {
        let status = StepStatus::new(StepName::new("tag"));
        let json = serde_json::to_value(&status).expect("serializable");
        assert_eq!(json["state"], "pending");
        assert_eq!(json["name"], "tag");
        assert_eq!(json["attempts"], 0);
    }
}
