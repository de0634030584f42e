//! Release pipeline driven by the rollout scheduler.
//!
//! This example demonstrates:
//! 1. Steps with fixed-interval retries and start delays
//! 2. A critical step that aborts the run when it finally fails
//! 3. Stopping the run with Ctrl-C
//! 4. A heartbeat reporting liveness while the run is in progress
//!
//! Run with `RUST_LOG=rollout=debug cargo run --example release_pipeline`.

use rollout::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn release_steps() -> Vec<StepSpec> {
    let retry = RetryPolicy::new(Duration::from_secs(1), 3);
    let smoke_attempts = Arc::new(AtomicU32::new(0));

    vec![
        StepSpec::new("build-artifacts")
            .work_fn(|| async {
                println!("building artifacts");
                Ok(())
            })
            .retry(retry)
            .on_success(|| println!("artifacts ready")),
        StepSpec::new("smoke-test")
            .work_fn(move || {
                let attempt = smoke_attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(StepError::new(format!("canary not healthy (attempt {attempt})")))
                    } else {
                        Ok(())
                    }
                }
            })
            .retry(retry)
            .start_delay(Duration::from_secs(1))
            .on_error(|err| eprintln!("smoke test gave up: {err}")),
        StepSpec::new("promote")
            .work_fn(|| async { Err(StepError::new("registry rejected the tag")) })
            .retry(retry)
            .start_delay(Duration::from_secs(1))
            .global_abort_on_failure(true)
            .on_error(|err| eprintln!("promotion failed, aborting: {err}")),
        StepSpec::new("announce")
            .work_fn(|| async {
                println!("release announced");
                Ok(())
            })
            .retry(retry)
            .start_delay(Duration::from_secs(1)),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let mut scheduler = Scheduler::with_config(SchedulerConfig::new("release-demo"));
    scheduler.add(release_steps())?;
    let scheduler = Arc::new(scheduler);

    let stopper = scheduler.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping");
            stopper.stop();
        }
    });

    let run = Arc::clone(&scheduler);
    let outcome = tokio::spawn(async move {
        run.start_with_heartbeat(0, || tracing::debug!("heartbeat")).await
    })
    .await??;

    println!("outcome: {outcome:?}");
    for status in scheduler.status_of() {
        println!("{}", serde_json::to_string(&status)?);
    }
    Ok(())
}
