//! Sequential drive loop over registered steps.

use crate::abort::{AbortHandle, AbortReason, AbortSignal};
use crate::config::SchedulerConfig;
use crate::executor::{Completion, StepExecutor};
use crate::heartbeat::Heartbeat;
use rollout_core::{SchedulerError, Step, StepName, StepSpec, StepStatus, ValidationError};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every step from the start index reached a terminal state.
    Completed,
    /// The abort signal stopped the loop while it was on step `index`.
    Aborted { reason: AbortReason, index: usize },
    /// Step `index` was cancelled through its own token before finishing.
    Cancelled { index: usize, step_name: StepName },
}

impl RunOutcome {
    /// Returns `true` when every step reached a terminal state.
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed)
    }
}

struct Slot {
    step: Arc<Step>,
    completion: Completion,
}

/// Runs registered steps one at a time, in registration order.
///
/// # Examples
///
/// ```
/// use rollout::prelude::*;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() {
/// let mut scheduler = Scheduler::new();
/// scheduler
///     .add([
///         StepSpec::new("build")
///             .work_fn(|| async { Ok(()) })
///             .retry(RetryPolicy::new(Duration::from_secs(1), 3)),
///         StepSpec::new("deploy")
///             .work_fn(|| async { Ok(()) })
///             .retry(RetryPolicy::once(Duration::from_secs(1)))
///             .global_abort_on_failure(true),
///     ])
///     .expect("valid steps");
///
/// let outcome = scheduler.start(0).await.expect("first run");
/// assert!(outcome.is_completed());
/// assert!(scheduler
///     .status_of()
///     .iter()
///     .all(|status| status.state == StepState::Success));
/// # }
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    slots: Vec<Slot>,
    abort: AbortSignal,
    started: AtomicBool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("name", &self.config.name)
            .field(
                "steps",
                &self.slots.iter().map(|s| s.step.name()).collect::<Vec<_>>(),
            )
            .field("aborted", &self.abort.is_raised())
            .finish()
    }
}

impl Scheduler {
    /// Creates an empty scheduler with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Creates an empty scheduler with the given configuration.
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            abort: AbortSignal::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Returns the scheduler configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validates and appends steps in order.
    ///
    /// Steps are checked one by one: when step `k` is rejected, the steps
    /// before it stay registered and the rest of the batch is not looked at.
    pub fn add<I>(&mut self, specs: I) -> Result<(), ValidationError>
    where
        I: IntoIterator<Item = StepSpec>,
    {
        for spec in specs {
            self.add_step(spec)?;
        }
        Ok(())
    }

    /// Validates and appends a single step.
    pub fn add_step(&mut self, spec: StepSpec) -> Result<(), ValidationError> {
        let index = self.slots.len();
        let step = spec.validate(index).map_err(|e| {
            warn!("Rejected step at index {}: {}", index, e);
            e
        })?;
        debug!("Registered step '{}' at index {}", step.name(), index);
        self.slots.push(Slot {
            step: Arc::new(step),
            completion: Completion::new(),
        });
        Ok(())
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` when no step is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Status snapshots of every step, in registration order.
    pub fn status_of(&self) -> Vec<StepStatus> {
        self.slots.iter().map(|slot| slot.step.status()).collect()
    }

    /// Raises the abort signal. Safe to call any number of times.
    pub fn stop(&self) {
        self.abort.raise(AbortReason::Stopped);
    }

    /// Handle for stopping the run from another task.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle::new(self.abort.clone())
    }

    /// Runs steps from `start_index` to the end, one at a time.
    ///
    /// Returns once every step is terminal, the run is aborted, or the current
    /// step is cancelled through its own token.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::AlreadyStarted`] when this scheduler already ran.
    pub async fn start(&self, start_index: usize) -> Result<RunOutcome, SchedulerError> {
        self.run(start_index, None).await
    }

    /// Like [`Scheduler::start`], with `beat` called at the configured
    /// heartbeat cadence until the run ends.
    pub async fn start_with_heartbeat<F>(
        &self,
        start_index: usize,
        beat: F,
    ) -> Result<RunOutcome, SchedulerError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let heartbeat = Heartbeat::new(self.config.heartbeat_interval(), beat);
        self.run(start_index, Some(heartbeat)).await
    }

    /// Runs [`Scheduler::start`] on its own task.
    pub fn spawn(
        self: &Arc<Self>,
        start_index: usize,
    ) -> JoinHandle<Result<RunOutcome, SchedulerError>> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.start(start_index).await })
    }

    async fn run(
        &self,
        start_index: usize,
        heartbeat: Option<Heartbeat>,
    ) -> Result<RunOutcome, SchedulerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let span = info_span!("run", name = %self.config.name);
        async move {
            let run_token = CancellationToken::new();
            let _stop_heartbeat = run_token.clone().drop_guard();
            if let Some(heartbeat) = heartbeat {
                debug!("Heartbeat every {:?}", heartbeat.interval());
                let _ = heartbeat.spawn(run_token, self.abort.clone());
            }

            info!(
                "Starting run at step {} of {}",
                start_index,
                self.slots.len()
            );
            let outcome = self.drive(start_index).await;
            info!("Run finished: {:?}", outcome);
            Ok(outcome)
        }
        .instrument(span)
        .await
    }

    async fn drive(&self, start_index: usize) -> RunOutcome {
        for (index, slot) in self.slots.iter().enumerate().skip(start_index) {
            if self.abort.is_raised() {
                return self.aborted(index);
            }

            let delay = slot.step.start_delay();
            if !delay.is_zero() {
                debug!("Delaying step '{}' by {:?}", slot.step.name(), delay);
                tokio::select! {
                    biased;
                    _ = self.abort.raised() => return self.aborted(index),
                    _ = sleep(delay) => {}
                }
            }

            let Some((done_tx, done_rx)) = slot.completion.take() else {
                warn!("Step '{}' was already scheduled", slot.step.name());
                return self.cancelled(index, slot);
            };

            info!("Scheduling step '{}' ({})", slot.step.name(), index);
            let executor =
                StepExecutor::new(index, Arc::clone(&slot.step), self.abort.clone(), done_tx);
            let _ = executor.arm();

            tokio::select! {
                biased;
                _ = self.abort.raised() => return self.aborted(index),
                done = done_rx => match done {
                    Ok(state) => debug!("Step '{}' finished as {:?}", slot.step.name(), state),
                    Err(_) => return self.cancelled(index, slot),
                },
            }
        }

        RunOutcome::Completed
    }

    fn aborted(&self, index: usize) -> RunOutcome {
        let reason = self.abort.reason().unwrap_or(AbortReason::Stopped);
        info!("Run aborted at step {}: {:?}", index, reason);
        RunOutcome::Aborted { reason, index }
    }

    fn cancelled(&self, index: usize, slot: &Slot) -> RunOutcome {
        info!("Step '{}' cancelled, ending run", slot.step.name());
        RunOutcome::Cancelled {
            index,
            step_name: slot.step.name().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollout_core::{RetryPolicy, StepError, StepState};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn ok_step(name: &str) -> StepSpec {
        StepSpec::new(name)
            .work_fn(|| async { Ok(()) })
            .retry(RetryPolicy::once(Duration::from_millis(100)))
    }

    #[test]
    fn test_add_keeps_prefix_on_validation_error() {
        let mut scheduler = Scheduler::new();
        let result = scheduler.add([
            ok_step("first"),
            StepSpec::new("no-work").retry(RetryPolicy::once(Duration::from_secs(1))),
            ok_step("never-seen"),
        ]);

        let error = assert_err!(result);
        assert!(matches!(error, ValidationError::MissingWork { .. }));
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.status_of()[0].name.as_str(), "first");
    }

    #[test]
    fn test_add_rejects_zero_interval() {
        let mut scheduler = Scheduler::new();
        let error = assert_err!(scheduler.add_step(
            StepSpec::new("instant").work_fn(|| async { Ok(()) })
        ));
        assert!(matches!(error, ValidationError::NonPositiveInterval { .. }));
        assert!(scheduler.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_is_rejected() {
        let mut scheduler = Scheduler::new();
        assert_ok!(scheduler.add_step(ok_step("only")));

        assert_eq!(assert_ok!(scheduler.start(0).await), RunOutcome::Completed);
        assert_eq!(
            assert_err!(scheduler.start(0).await),
            SchedulerError::AlreadyStarted
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_index_skips_earlier_steps() {
        let mut scheduler = Scheduler::new();
        assert_ok!(scheduler.add([ok_step("a"), ok_step("b"), ok_step("c")]));

        assert!(assert_ok!(scheduler.start(1).await).is_completed());
        let states: Vec<_> = scheduler.status_of().iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![StepState::Pending, StepState::Success, StepState::Success]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_index_past_end_completes_immediately() {
        let mut scheduler = Scheduler::new();
        assert_ok!(scheduler.add_step(ok_step("a")));
        assert!(assert_ok!(scheduler.start(5).await).is_completed());
        assert_eq!(scheduler.status_of()[0].state, StepState::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_failure_does_not_stop_run() {
        let mut scheduler = Scheduler::new();
        assert_ok!(scheduler.add([
            StepSpec::new("optional")
                .work_fn(|| async { Err(StepError::new("flaky mirror")) })
                .retry(RetryPolicy::new(Duration::from_millis(100), 2)),
            ok_step("after"),
        ]));

        assert!(assert_ok!(scheduler.start(0).await).is_completed());
        let statuses = scheduler.status_of();
        assert_eq!(statuses[0].state, StepState::SingleFailed);
        assert_eq!(statuses[0].attempts, 2);
        assert_eq!(statuses[0].result_message, "step failed: flaky mirror");
        assert_eq!(statuses[1].state, StepState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_start_delay() {
        let mut scheduler = Scheduler::new();
        assert_ok!(scheduler.add_step(ok_step("slow-start").start_delay(Duration::from_secs(60))));
        let scheduler = Arc::new(scheduler);

        let handle = scheduler.spawn(0);
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.abort_handle().stop();

        let outcome = assert_ok!(handle.await.expect("run task"));
        assert_eq!(
            outcome,
            RunOutcome::Aborted {
                reason: AbortReason::Stopped,
                index: 0
            }
        );
        assert_eq!(scheduler.status_of()[0].start_time, None);
    }
}
