//! Liveness ticker that runs alongside a scheduler run.

use crate::abort::AbortSignal;
use crate::config::DEFAULT_HEARTBEAT_INTERVAL;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A callback invoked on a fixed cadence for the duration of a run,
/// independent of step progress.
#[derive(Clone)]
pub(crate) struct Heartbeat {
    interval: Duration,
    beat: Arc<dyn Fn() + Send + Sync>,
}

impl Heartbeat {
    /// A zero `interval` is replaced by [`DEFAULT_HEARTBEAT_INTERVAL`].
    pub(crate) fn new<F>(interval: Duration, beat: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            interval: if interval.is_zero() {
                DEFAULT_HEARTBEAT_INTERVAL
            } else {
                interval
            },
            beat: Arc::new(beat),
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks until `run` is cancelled or `abort` is raised. The first beat
    /// happens one interval after spawning.
    pub(crate) fn spawn(self, run: CancellationToken, abort: AbortSignal) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = run.cancelled() => {
                        debug!("Heartbeat stopped: run ended");
                        return;
                    }
                    _ = abort.raised() => {
                        debug!("Heartbeat stopped: run aborted");
                        return;
                    }
                    _ = ticker.tick() => (self.beat)(),
                }
            }
        })
    }
}

impl fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heartbeat")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
