//! A sequential step scheduler for release-style pipelines.
//!
//! Steps run strictly in registration order. Each step retries on a fixed
//! interval up to its attempt budget, may wait out a start delay first, and
//! may abort the whole run when it finally fails.
//!
//! # Example
//!
//! ```rust
//! use rollout::prelude::*;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread", start_paused = true)]
//! # async fn main() {
//! let mut scheduler = Scheduler::with_config(SchedulerConfig::new("web-release"));
//! scheduler
//!     .add([
//!         StepSpec::new("migrate")
//!             .work_fn(|| async { Err(StepError::new("database locked")) })
//!             .retry(RetryPolicy::new(Duration::from_secs(2), 3))
//!             .global_abort_on_failure(true),
//!         StepSpec::new("deploy")
//!             .work_fn(|| async { Ok(()) })
//!             .retry(RetryPolicy::once(Duration::from_secs(1))),
//!     ])
//!     .expect("valid steps");
//!
//! let outcome = scheduler.start(0).await.expect("first run");
//! assert!(matches!(outcome, RunOutcome::Aborted { index: 0, .. }));
//!
//! let statuses = scheduler.status_of();
//! assert_eq!(statuses[0].state, StepState::GlobalFailed);
//! assert_eq!(statuses[1].state, StepState::Pending);
//! # }
//! ```

mod abort;
mod config;
mod executor;
mod heartbeat;
mod scheduler;

// Re-export core types
pub use rollout_core::*;

pub use abort::{AbortHandle, AbortReason};
pub use config::{SchedulerConfig, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_NAME};
pub use scheduler::{RunOutcome, Scheduler};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        AbortHandle, AbortReason, RetryPolicy, RunOutcome, Scheduler, SchedulerConfig,
        SchedulerError, StepError, StepName, StepSpec, StepState, StepStatus, ValidationError,
        Work,
    };
}
