//! Run-wide abort signal.

use rollout_core::StepName;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Why a run was aborted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// [`AbortHandle::stop`] or `Scheduler::stop` was called.
    Stopped,
    /// A step marked `global_abort_on_failure` ran out of attempts.
    StepFailed {
        /// Registration index of the failed step.
        index: usize,
        /// Name of the failed step.
        step_name: StepName,
    },
}

/// Broadcast abort flag shared by the drive loop and every armed step.
///
/// Raising is monotonic and idempotent: the first reason wins, later raises
/// are no-ops. Any number of tasks can wait on [`AbortSignal::raised`].
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<AbortReason>>,
}

impl AbortSignal {
    /// Creates a signal that is not raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the signal. Returns `true` only for the call that raised it.
    pub fn raise(&self, reason: AbortReason) -> bool {
        let first = self.reason.set(reason).is_ok();
        // reason is published before waiters wake up
        self.token.cancel();
        if first {
            info!("Abort raised: {:?}", self.reason.get());
        } else {
            debug!("Abort already raised, ignoring");
        }
        first
    }

    /// Returns `true` once any raise happened.
    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The reason recorded by the first raise.
    pub fn reason(&self) -> Option<AbortReason> {
        self.reason.get().cloned()
    }

    /// Completes once the signal is raised.
    pub async fn raised(&self) {
        self.token.cancelled().await
    }
}

/// Cloneable handle that stops a run from outside the scheduler.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    signal: AbortSignal,
}

impl AbortHandle {
    pub(crate) fn new(signal: AbortSignal) -> Self {
        Self { signal }
    }

    /// Stops the run before its next step is scheduled.
    pub fn stop(&self) {
        self.signal.raise(AbortReason::Stopped);
    }

    /// Returns `true` once the run was aborted for any reason.
    pub fn is_stopped(&self) -> bool {
        self.signal.is_raised()
    }
}
