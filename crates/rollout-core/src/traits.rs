//! The unit-of-work abstraction a step runs on every attempt.

use crate::error::StepError;
use async_trait::async_trait;
use std::fmt;
use std::future::Future;

/// Work executed by a step.
///
/// Every attempt calls [`Work::run`] once. Returning `Err` consumes one
/// attempt of the step's retry budget.
///
/// # Examples
///
/// ```
/// use rollout_core::{StepError, Work};
/// use async_trait::async_trait;
///
/// #[derive(Debug)]
/// struct HealthProbe {
///     url: String,
/// }
///
/// #[async_trait]
/// impl Work for HealthProbe {
///     async fn run(&self) -> Result<(), StepError> {
///         if self.url.is_empty() {
///             return Err(StepError::new("no url configured"));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Work: Send + Sync {
    /// Runs one attempt.
    async fn run(&self) -> Result<(), StepError>;
}

/// Adapts an async closure into [`Work`].
///
/// Built by `StepSpec::work_fn`; rarely named directly.
pub struct FnWork<F> {
    f: F,
}

impl<F, Fut> FnWork<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StepError>> + Send + 'static,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnWork<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWork").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> Work for FnWork<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), StepError>> + Send + 'static,
{
    async fn run(&self) -> Result<(), StepError> {
        (self.f)().await
    }
}
