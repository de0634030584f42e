//! Timer-driven execution of a single step.

use crate::abort::{AbortReason, AbortSignal};
use chrono::{DateTime, TimeDelta, Utc};
use rollout_core::{RetryMachine, Step, StepError, StepState, Transition};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

type CompletionPair = (oneshot::Sender<StepState>, oneshot::Receiver<StepState>);

/// One-shot signal a step fires when it reaches a terminal state.
///
/// Allocated at registration and handed out exactly once.
#[derive(Debug)]
pub(crate) struct Completion {
    pair: Mutex<Option<CompletionPair>>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        Self {
            pair: Mutex::new(Some(oneshot::channel())),
        }
    }

    pub(crate) fn take(&self) -> Option<CompletionPair> {
        self.pair
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Wall-clock start paired with the runtime instant it was taken at.
///
/// End times are derived from the measured duration so that
/// `end_time == start_time + duration` holds on every clock.
#[derive(Debug, Clone, Copy)]
struct StartedAt {
    wall: DateTime<Utc>,
    instant: Instant,
}

impl StartedAt {
    fn now() -> Self {
        Self {
            wall: Utc::now(),
            instant: Instant::now(),
        }
    }

    fn finish(&self) -> (DateTime<Utc>, Duration) {
        let duration = self.instant.elapsed();
        let ended = TimeDelta::from_std(duration)
            .ok()
            .and_then(|elapsed| self.wall.checked_add_signed(elapsed))
            .unwrap_or_else(Utc::now);
        (ended, duration)
    }
}

/// Drives one armed step through its retry machine.
pub(crate) struct StepExecutor {
    index: usize,
    step: Arc<Step>,
    machine: RetryMachine,
    abort: AbortSignal,
    done: oneshot::Sender<StepState>,
}

impl StepExecutor {
    pub(crate) fn new(
        index: usize,
        step: Arc<Step>,
        abort: AbortSignal,
        done: oneshot::Sender<StepState>,
    ) -> Self {
        let machine = RetryMachine::new(step.retry_policy());
        Self {
            index,
            step,
            machine,
            abort,
            done,
        }
    }

    /// Records the start time, arms the timer and runs the step on its own
    /// task. Dropping out without a terminal state drops `done`, which the
    /// drive loop reads as cancellation.
    pub(crate) fn arm(mut self) -> JoinHandle<()> {
        let started = StartedAt::now();
        self.step.record().mark_started(started.wall);
        self.machine.arm();
        tokio::spawn(async move { self.run(started).await })
    }

    async fn run(mut self, started: StartedAt) {
        loop {
            if !self.wait_for_fire().await {
                return;
            }

            self.machine.begin_attempt();
            let attempt = self.step.record().record_attempt();
            debug!("Step '{}' attempt {}", self.step.name(), attempt);

            let outcome = self.step.attempt().await;
            match (self.machine.complete_attempt(&outcome), outcome) {
                (Some(Transition::Succeeded), _) => {
                    self.succeed(started);
                    return;
                }
                (Some(Transition::Retry { remaining, interval }), Err(err)) => {
                    warn!(
                        "Step '{}' failed: {}, retrying in {:?} ({} attempts left)",
                        self.step.name(),
                        err,
                        interval,
                        remaining
                    );
                    self.machine.arm();
                }
                (Some(Transition::Exhausted), Err(err)) => {
                    self.fail(err, started);
                    return;
                }
                _ => return,
            }
        }
    }

    /// Waits one interval. Returns `false` when the fire must be discarded
    /// because the step was cancelled or the run aborted.
    async fn wait_for_fire(&self) -> bool {
        let cancelled = async {
            match self.step.cancel_token() {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.abort.raised() => {}
            _ = cancelled => {}
            _ = sleep(self.machine.interval()) => {}
        }

        if self.abort.is_raised() || self.step.is_cancelled() {
            debug!(
                "Step '{}' fire discarded: {}",
                self.step.name(),
                if self.abort.is_raised() {
                    "run aborted"
                } else {
                    "step cancelled"
                }
            );
            return false;
        }
        true
    }

    fn succeed(self, started: StartedAt) {
        let (ended, duration) = started.finish();
        self.step.notify_success();
        self.step
            .record()
            .finish(StepState::Success, None, ended, duration);
        info!(
            "Step '{}' completed successfully after {} attempt(s)",
            self.step.name(),
            self.machine.attempts()
        );
        let _ = self.done.send(StepState::Success);
    }

    fn fail(self, err: StepError, started: StartedAt) {
        let (ended, duration) = started.finish();
        self.step.notify_error(&err);

        let state = if self.step.global_abort_on_failure() {
            StepState::GlobalFailed
        } else {
            StepState::SingleFailed
        };
        self.step.record().finish(state, Some(&err), ended, duration);
        warn!(
            "Step '{}' failed after {} attempt(s): {}",
            self.step.name(),
            self.machine.attempts(),
            err
        );

        if state == StepState::GlobalFailed {
            // raised before completion so the drive loop never advances past us
            self.abort.raise(AbortReason::StepFailed {
                index: self.index,
                step_name: self.step.name().clone(),
            });
        }
        let _ = self.done.send(state);
    }
}
