//! Error types for registration, step execution and scheduling.

use crate::step::StepName;
use std::fmt;
use thiserror::Error;

/// A step spec was rejected at registration time.
///
/// Returned synchronously by `Scheduler::add`; never produced once a run is
/// underway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The step has no work attached.
    #[error("step '{step_name}': work function required")]
    MissingWork {
        /// The rejected step.
        step_name: StepName,
    },

    /// The retry interval is zero.
    #[error("step '{step_name}': interval must be positive")]
    NonPositiveInterval {
        /// The rejected step.
        step_name: StepName,
    },
}

impl ValidationError {
    /// Name of the step that failed validation.
    pub fn step_name(&self) -> &StepName {
        match self {
            ValidationError::MissingWork { step_name }
            | ValidationError::NonPositiveInterval { step_name } => step_name,
        }
    }
}

/// Error returned by a step's work.
///
/// Retried inside the engine until the attempt budget runs out; after that it
/// is handed to the step's `on_error` callback and rendered into the result
/// message of its status.
#[derive(Debug)]
pub struct StepError {
    details: String,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StepError {
    /// Creates an error from a plain message.
    pub fn new(details: impl Into<String>) -> Self {
        Self {
            details: details.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary error, keeping it as the source.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            details: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// Human readable failure details.
    pub fn details(&self) -> &str {
        &self.details
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.details)
    }
}

impl std::error::Error for StepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<&str> for StepError {
    fn from(details: &str) -> Self {
        Self::new(details)
    }
}

impl From<String> for StepError {
    fn from(details: String) -> Self {
        Self::new(details)
    }
}

/// Errors raised by the scheduler itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchedulerError {
    /// `start` was called on a scheduler that already ran.
    #[error("scheduler has already been started")]
    AlreadyStarted,
}
