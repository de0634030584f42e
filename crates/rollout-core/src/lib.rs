//! Core types for the rollout step scheduler.
//!
//! This crate has no runtime dependency. It defines what a step is and how
//! its retries progress; the `rollout` crate drives them on tokio.
//!
//! # Core Types
//!
//! - [`StepSpec`] - Builder describing a step before registration
//! - [`Step`] - A validated step with normalized policy and hooks
//! - [`Work`] - The unit of work run on every attempt
//! - [`RetryPolicy`] / [`RetryMachine`] - Fixed-interval retry budget and its state machine
//! - [`StepStatus`] - Snapshot of a step's progress
//! - [`ValidationError`], [`StepError`], [`SchedulerError`] - Error types

mod error;
mod retry;
mod status;
mod step;
mod traits;

pub use error::{SchedulerError, StepError, ValidationError};
pub use retry::{Phase, RetryMachine, Transition};
#[doc(hidden)]
pub use status::StatusRecord;
pub use status::{StepState, StepStatus};
pub use step::{RetryPolicy, Step, StepName, StepSpec};
pub use traits::{FnWork, Work};
