//! Lifecycle monitor: watches a run until its worker exits, then performs
//! the single, ordered teardown.
//!
//! Teardown order: mark terminated, grace pause, join readers, drain the
//! event queue, classify, emit the outcome, release the slot, signal idle.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::notify::Notifier;
use crate::outcome::{Outcome, classify, exit_code};
use crate::router::OutputRouter;
use crate::run::{RunHandle, RunSlot, RunState};

/// Everything the monitor needs for one run.
pub struct Monitor {
    pub run: Arc<RunHandle>,
    pub router: OutputRouter,
    pub slot: Arc<RunSlot>,
    pub notifier: Arc<dyn Notifier>,
    pub config: SupervisorConfig,
}

impl Monitor {
    /// Supervise until exit and return the outcome that was emitted.
    pub async fn run(self) -> Outcome {
        let Self {
            run,
            router,
            slot,
            notifier,
            config,
        } = self;

        let code = poll_until_exit(&run, config.poll_interval).await;
        run.advance(RunState::Terminated);
        debug!(run_id = %run.id(), code, "worker exit observed");

        tokio::time::sleep(config.exit_grace).await;
        router.finish(&config).await;

        let outcome = classify(code, run.found_result(), run.stop_requested());
        info!(
            run_id = %run.id(),
            code,
            reason = %outcome.exit_reason(),
            "worker finished"
        );

        notifier.on_outcome(outcome.clone());
        if !slot.release(run.id()) {
            warn!(run_id = %run.id(), "run was not registered in the slot at teardown");
        }
        notifier.on_idle();
        outcome
    }
}

/// Poll the exit status every `interval`.
///
/// A poll error ends supervision with [`exit_code::POLL_FAILURE`] after a
/// best-effort kill, so an unobservable process is not left behind.
async fn poll_until_exit(run: &RunHandle, interval: Duration) -> i32 {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match run.poll_exit().await {
            Ok(Some(code)) => return code,
            Ok(None) => {}
            Err(e) => {
                warn!(run_id = %run.id(), error = %e, "failed to poll worker status");
                if let Err(e) = run.kill().await {
                    debug!(run_id = %run.id(), error = %e, "kill after poll failure failed");
                }
                return exit_code::POLL_FAILURE;
            }
        }
    }
}
