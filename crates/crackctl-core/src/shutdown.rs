//! Shutdown controller: the stop protocol for a running worker.
//!
//! 1. Mark the run as user-stopped.
//! 2. If a skip list is configured, create `<skip-list>.stop` so the
//!    worker can checkpoint and exit on its own.
//! 3. Poll for exit during the grace period.
//! 4. Send a graceful terminate, wait briefly.
//! 5. Send a forced kill.
//! 6. Remove the stop flag, whatever happened above.
//!
//! The controller never emits the outcome or releases the run; the
//! lifecycle monitor observes the exit and does that.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::run::{RunHandle, RunState};

/// How far the stop protocol had to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// The process had already exited; nothing was done.
    AlreadyExited,
    /// Another stop request is already in progress.
    AlreadyStopping,
    /// The run has no process yet.
    NotStarted,
    /// The worker exited during the grace period.
    Cooperative,
    /// The worker exited after the terminate signal.
    Terminated,
    /// The worker exited after the kill signal.
    Killed,
    /// Even the kill was not observed to take effect in time.
    Unconfirmed,
}

/// A signal the controller attempted to deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSignal {
    Terminate,
    Kill,
}

/// What a call to [`stop`] did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopReport {
    pub escalation: Escalation,
    /// Signals attempted, in order.
    pub signals: Vec<StopSignal>,
    pub flag_created: bool,
    pub flag_removed: bool,
    pub elapsed: Duration,
}

impl StopReport {
    fn noop(escalation: Escalation) -> Self {
        Self {
            escalation,
            signals: Vec::new(),
            flag_created: false,
            flag_removed: false,
            elapsed: Duration::ZERO,
        }
    }
}

/// Run the stop protocol against `run`.
///
/// Idempotent: a run that already exited, or one that another call is
/// already stopping, is left alone.
pub async fn stop(run: &RunHandle, config: &SupervisorConfig) -> StopReport {
    match run.state() {
        RunState::Idle | RunState::Launching => return StopReport::noop(Escalation::NotStarted),
        RunState::Stopping => return StopReport::noop(Escalation::AlreadyStopping),
        RunState::Terminated => return StopReport::noop(Escalation::AlreadyExited),
        RunState::Running => {}
    }

    match run.poll_exit().await {
        Ok(Some(code)) => {
            debug!(run_id = %run.id(), code, "stop requested after worker exited");
            return StopReport::noop(Escalation::AlreadyExited);
        }
        Ok(None) => {}
        Err(e) => warn!(run_id = %run.id(), error = %e, "failed to poll worker before stopping"),
    }

    if !run.advance(RunState::Stopping) {
        // Lost a race with the monitor or another stop call.
        return StopReport::noop(match run.state() {
            RunState::Stopping => Escalation::AlreadyStopping,
            _ => Escalation::AlreadyExited,
        });
    }

    let started = Instant::now();
    run.request_stop();
    info!(run_id = %run.id(), pid = ?run.pid(), "stopping worker");

    let flag = run.job().skip_list().map(|skip| skip.stop_flag_path());
    let flag_created = match &flag {
        Some(path) => create_flag(path).await,
        None => false,
    };

    let mut signals = Vec::new();
    let escalation = escalate(run, config, &mut signals).await;

    let flag_removed = match &flag {
        Some(path) => remove_flag(path).await,
        None => false,
    };

    let elapsed = started.elapsed();
    info!(
        run_id = %run.id(),
        escalation = ?escalation,
        elapsed_ms = elapsed.as_millis() as u64,
        "stop sequence finished"
    );

    StopReport {
        escalation,
        signals,
        flag_created,
        flag_removed,
        elapsed,
    }
}

async fn escalate(
    run: &RunHandle,
    config: &SupervisorConfig,
    signals: &mut Vec<StopSignal>,
) -> Escalation {
    if wait_for_exit(run, config.stop_grace, config.stop_poll_interval).await {
        info!(run_id = %run.id(), "worker exited cooperatively");
        return Escalation::Cooperative;
    }

    warn!(
        run_id = %run.id(),
        grace_ms = config.stop_grace.as_millis() as u64,
        "worker still running after grace period; sending terminate"
    );
    signals.push(StopSignal::Terminate);
    if let Err(e) = run.terminate().await {
        warn!(run_id = %run.id(), step = "terminate", error = %e, "signal failed");
    }
    if wait_for_exit(run, config.terminate_wait, config.stop_poll_interval).await {
        return Escalation::Terminated;
    }

    warn!(run_id = %run.id(), "worker ignored terminate; killing");
    signals.push(StopSignal::Kill);
    if let Err(e) = run.kill().await {
        warn!(run_id = %run.id(), step = "kill", error = %e, "signal failed");
    }
    if wait_for_exit(run, config.kill_wait, config.stop_poll_interval).await {
        Escalation::Killed
    } else {
        warn!(run_id = %run.id(), "worker exit not observed after kill");
        Escalation::Unconfirmed
    }
}

/// Poll every `every` until the worker exits or `within` elapses.
async fn wait_for_exit(run: &RunHandle, within: Duration, every: Duration) -> bool {
    let deadline = Instant::now() + within;
    loop {
        match run.poll_exit().await {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(e) => {
                warn!(run_id = %run.id(), error = %e, "failed to poll worker while stopping");
                return false;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep(every.min(deadline - now)).await;
    }
}

async fn create_flag(path: &Path) -> bool {
    match tokio::fs::File::create(path).await {
        Ok(_) => {
            debug!(path = %path.display(), "created stop flag");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to create stop flag");
            false
        }
    }
}

/// Remove the flag; a flag already gone counts as removed.
async fn remove_flag(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove stop flag");
            false
        }
    }
}

/// Remove a stop flag left behind by an earlier, interrupted session.
///
/// Returns `true` if one was found and deleted.
pub async fn clear_stale_flag(flag: PathBuf) -> bool {
    match tokio::fs::try_exists(&flag).await {
        Ok(true) => {
            let removed = remove_flag(&flag).await;
            if removed {
                info!(path = %flag.display(), "removed stale stop flag");
            }
            removed
        }
        _ => false,
    }
}

/// Kill the worker without a grace period and remove its stop flag.
///
/// For callers about to exit the process, where neither the stop protocol
/// nor `kill_on_drop` will get a chance to run.
pub async fn force_stop(run: &RunHandle) {
    run.request_stop();
    run.advance(RunState::Stopping);
    warn!(run_id = %run.id(), pid = ?run.pid(), "force stopping worker");
    if let Err(e) = run.kill().await {
        warn!(run_id = %run.id(), step = "kill", error = %e, "signal failed");
    }
    if let Some(skip) = run.job().skip_list() {
        remove_flag(&skip.stop_flag_path()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn remove_flag_tolerates_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(remove_flag(&tmp.path().join("skip.bf.stop")).await);
    }

    #[tokio::test]
    async fn stale_flag_is_cleared() {
        let tmp = tempfile::tempdir().unwrap();
        let flag = tmp.path().join("skip.bf.stop");
        assert!(!clear_stale_flag(flag.clone()).await);

        std::fs::write(&flag, b"").unwrap();
        assert!(clear_stale_flag(flag.clone()).await);
        assert!(!flag.exists());
    }

    #[test]
    fn report_serializes_snake_case() {
        let report = StopReport {
            escalation: Escalation::Killed,
            signals: vec![StopSignal::Terminate, StopSignal::Kill],
            flag_created: true,
            flag_removed: true,
            elapsed: Duration::from_millis(8500),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["escalation"], "killed");
        assert_eq!(json["signals"], serde_json::json!(["terminate", "kill"]));
    }
}
