use crate::error::{StepError, ValidationError};
use crate::status::{StatusRecord, StepStatus};
use crate::traits::{FnWork, Work};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Type-safe step name wrapper.
///
/// # Examples
///
/// ```
/// use rollout_core::StepName;
///
/// let name = StepName::new("migrate-db");
/// assert_eq!(name.as_str(), "migrate-db");
///
/// let name: StepName = "smoke-test".into();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name given to an unnamed step registered at `index`.
    pub fn positional(index: usize) -> Self {
        Self(format!("step-{index}"))
    }

    /// Returns the step name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StepName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StepName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for StepName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Fixed-interval retry policy.
///
/// The first attempt fires one `interval` after the step is armed, and every
/// retry fires one `interval` after the previous failure. There is no backoff
/// growth.
///
/// # Examples
///
/// ```
/// use rollout_core::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(Duration::from_secs(30), 3);
/// assert_eq!(policy.max_attempts(), 3);
///
/// // Zero attempts is read as "run once".
/// let policy = RetryPolicy::new(Duration::from_secs(1), 0);
/// assert_eq!(policy.max_attempts(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    interval: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy, normalizing `max_attempts` to at least one.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// A policy that never retries.
    pub fn once(interval: Duration) -> Self {
        Self::new(interval, 1)
    }

    /// Time between arming and each attempt.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total number of attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    /// Zero interval, one attempt. Registration rejects the zero interval, so
    /// every step has to choose its own.
    fn default() -> Self {
        Self::new(Duration::ZERO, 1)
    }
}

pub(crate) type SuccessHook = Arc<dyn Fn() + Send + Sync>;
pub(crate) type ErrorHook = Arc<dyn Fn(&StepError) + Send + Sync>;

/// Caller-side description of a step, consumed at registration.
///
/// # Examples
///
/// ```
/// use rollout_core::{RetryPolicy, StepError, StepSpec};
/// use std::time::Duration;
///
/// let spec = StepSpec::new("push-image")
///     .work_fn(|| async { Ok::<(), StepError>(()) })
///     .retry(RetryPolicy::new(Duration::from_secs(5), 3))
///     .start_delay(Duration::from_secs(1))
///     .global_abort_on_failure(true)
///     .on_error(|err| eprintln!("push failed: {err}"));
///
/// let step = spec.validate(0).expect("valid step");
/// assert_eq!(step.name().as_str(), "push-image");
/// ```
#[derive(Default)]
pub struct StepSpec {
    name: Option<StepName>,
    work: Option<Arc<dyn Work>>,
    retry: RetryPolicy,
    start_delay: Duration,
    on_success: Option<SuccessHook>,
    on_error: Option<ErrorHook>,
    global_abort_on_failure: bool,
    cancel: Option<CancellationToken>,
}

impl StepSpec {
    /// Starts a spec for a named step.
    pub fn new(name: impl Into<StepName>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets the work run on every attempt.
    pub fn work<W: Work + 'static>(mut self, work: W) -> Self {
        self.work = Some(Arc::new(work));
        self
    }

    /// Sets an async closure as the work.
    pub fn work_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StepError>> + Send + 'static,
    {
        self.work(FnWork::new(f))
    }

    /// Sets the retry interval and attempt budget.
    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Delay between the run reaching this step and arming its timer.
    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    /// Called once after a successful attempt, before the step completes.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    /// Called once with the last error when the attempts run out.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&StepError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Abort the whole run when this step exhausts its attempts.
    pub fn global_abort_on_failure(mut self, abort: bool) -> Self {
        self.global_abort_on_failure = abort;
        self
    }

    /// Token checked before every attempt; once cancelled the step stops firing.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Checks the spec and turns it into a runnable [`Step`].
    ///
    /// `index` is the registration position, used to name unnamed steps.
    ///
    /// # Errors
    ///
    /// - [`ValidationError::MissingWork`] when no work was set
    /// - [`ValidationError::NonPositiveInterval`] when the interval is zero
    pub fn validate(self, index: usize) -> Result<Step, ValidationError> {
        let name = self.name.unwrap_or_else(|| StepName::positional(index));

        let work = self.work.ok_or_else(|| ValidationError::MissingWork {
            step_name: name.clone(),
        })?;

        if self.retry.interval().is_zero() {
            return Err(ValidationError::NonPositiveInterval { step_name: name });
        }

        Ok(Step {
            status: StatusRecord::new(name.clone()),
            name,
            work,
            retry: self.retry,
            start_delay: self.start_delay,
            on_success: self.on_success.unwrap_or_else(|| Arc::new(|| {})),
            on_error: self.on_error.unwrap_or_else(|| Arc::new(|_: &StepError| {})),
            global_abort_on_failure: self.global_abort_on_failure,
            cancel: self.cancel,
        })
    }
}

impl fmt::Debug for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepSpec")
            .field("name", &self.name)
            .field("has_work", &self.work.is_some())
            .field("retry", &self.retry)
            .field("start_delay", &self.start_delay)
            .field("global_abort_on_failure", &self.global_abort_on_failure)
            .finish_non_exhaustive()
    }
}

/// A validated, registered step.
///
/// Callbacks always exist (no-ops when the spec left them out) and the retry
/// policy is normalized. The status record is written by the engine only.
pub struct Step {
    name: StepName,
    work: Arc<dyn Work>,
    retry: RetryPolicy,
    start_delay: Duration,
    on_success: SuccessHook,
    on_error: ErrorHook,
    global_abort_on_failure: bool,
    cancel: Option<CancellationToken>,
    status: StatusRecord,
}

impl Step {
    /// Returns the step name.
    pub fn name(&self) -> &StepName {
        &self.name
    }

    /// Returns the normalized retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Returns the delay waited before the timer is armed.
    pub fn start_delay(&self) -> Duration {
        self.start_delay
    }

    /// Returns whether exhausting the attempts aborts the run.
    pub fn global_abort_on_failure(&self) -> bool {
        self.global_abort_on_failure
    }

    /// True once the step's own cancellation token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }

    /// The step's own cancellation token, if one was supplied.
    pub fn cancel_token(&self) -> Option<&CancellationToken> {
        self.cancel.as_ref()
    }

    /// Runs a single attempt of the work.
    pub async fn attempt(&self) -> Result<(), StepError> {
        self.work.run().await
    }

    /// Runs the success hook.
    pub fn notify_success(&self) {
        (self.on_success)();
    }

    /// Runs the error hook with the last error.
    pub fn notify_error(&self, error: &StepError) {
        (self.on_error)(error);
    }

    /// Engine-side handle to the status record.
    #[doc(hidden)]
    pub fn record(&self) -> &StatusRecord {
        &self.status
    }

    /// Snapshot of the current status.
    pub fn status(&self) -> StepStatus {
        self.status.snapshot()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("start_delay", &self.start_delay)
            .field("global_abort_on_failure", &self.global_abort_on_failure)
            .field("status", &self.status.snapshot())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StepState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn ok_spec(name: &str) -> StepSpec {
        StepSpec::new(name)
            .work_fn(|| async { Ok(()) })
            .retry(RetryPolicy::new(Duration::from_millis(10), 3))
    }

    #[test]
    fn test_retry_policy_normalizes_attempts() {
        assert_eq!(RetryPolicy::new(Duration::from_secs(1), 0).max_attempts(), 1);
        assert_eq!(RetryPolicy::new(Duration::from_secs(1), 5).max_attempts(), 5);
        assert_eq!(RetryPolicy::once(Duration::from_secs(1)).max_attempts(), 1);
    }

    #[test]
    fn test_validate_rejects_missing_work() {
        let spec = StepSpec::new("empty").retry(RetryPolicy::once(Duration::from_secs(1)));
        let error = assert_err!(spec.validate(0));
        assert_eq!(
            error,
            ValidationError::MissingWork {
                step_name: StepName::new("empty")
            }
        );
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let spec = StepSpec::new("fast").work_fn(|| async { Ok(()) });
        let error = assert_err!(spec.validate(0));
        assert!(matches!(error, ValidationError::NonPositiveInterval { .. }));
        assert!(error.to_string().contains("interval must be positive"));
    }

    #[test]
    fn test_validate_names_unnamed_steps_by_position() {
        let spec = StepSpec::default()
            .work_fn(|| async { Ok(()) })
            .retry(RetryPolicy::once(Duration::from_secs(1)));
        let step = assert_ok!(spec.validate(4));
        assert_eq!(step.name(), &"step-4");
    }

    #[test]
    fn test_validated_step_starts_pending() {
        let step = assert_ok!(ok_spec("build").validate(0));
        let status = step.status();
        assert_eq!(status.state, StepState::Pending);
        assert_eq!(status.name.as_str(), "build");
        assert!(status.start_time.is_none());
        assert_eq!(step.retry_policy().max_attempts(), 3);
        assert!(!step.global_abort_on_failure());
        assert!(!step.is_cancelled());
    }

    #[test]
    fn test_missing_hooks_default_to_noop() {
        let step = assert_ok!(ok_spec("quiet").validate(0));
        step.notify_success();
        step.notify_error(&StepError::new("ignored"));
    }

    #[test]
    fn test_hooks_are_invoked() {
        let successes = Arc::new(AtomicU32::new(0));
        let errors = Arc::new(AtomicU32::new(0));
        let s = successes.clone();
        let e = errors.clone();
        let step = assert_ok!(ok_spec("hooked")
            .on_success(move || {
                s.fetch_add(1, Ordering::SeqCst);
            })
            .on_error(move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            })
            .validate(0));

        step.notify_success();
        step.notify_error(&StepError::new("x"));
        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_token_observed() {
        let token = CancellationToken::new();
        let step = assert_ok!(ok_spec("cancellable").cancel_token(token.clone()).validate(0));
        assert!(!step.is_cancelled());
        token.cancel();
        assert!(step.is_cancelled());
    }

    #[tokio::test]
    async fn test_attempt_runs_work() {
        let step = assert_ok!(StepSpec::new("failing")
            .work_fn(|| async { Err(StepError::new("nope")) })
            .retry(RetryPolicy::once(Duration::from_secs(1)))
            .validate(0));
        let error = assert_err!(step.attempt().await);
        assert_eq!(error.details(), "nope");
    }

    #[test]
    fn test_status_snapshot_is_detached() {
        let step = assert_ok!(ok_spec("deploy").validate(0));
        let mut snapshot = step.status();
        snapshot.state = StepState::Success;
        snapshot.attempts = 7;

        let status = step.status();
        assert_eq!(status.state, StepState::Pending);
        assert_eq!(status.attempts, 0);
        assert_eq!(status.start_time, None);
    }
}
