//! Worker launcher: the entry point for starting and stopping runs.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::SupervisorConfig;
use crate::job::JobDescriptor;
use crate::monitor::Monitor;
use crate::notify::Notifier;
use crate::outcome::{Outcome, exit_code};
use crate::router::OutputRouter;
use crate::run::{RunHandle, RunSlot, RunState};
use crate::shutdown::{self, StopReport};
use crate::skip_list::{self, ClearResult, SkipListError};
use crate::worker::{CommandSpawner, Spawner, WorkerCommand};

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("a run is already active ({active})")]
    AlreadyRunning { active: Uuid },

    #[error("archive {0:?} no longer exists")]
    ArchiveMissing(PathBuf),

    #[error("worker executable not found at {path:?}")]
    ExecutableNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to start worker {path:?}: {source}")]
    OsLaunchFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Starts the worker for a job and wires up routing and monitoring.
///
/// Holds the single run slot: a second launch while a run is active fails
/// with [`LaunchError::AlreadyRunning`].
pub struct Launcher {
    worker: PathBuf,
    spawner: Arc<dyn Spawner>,
    notifier: Arc<dyn Notifier>,
    slot: Arc<RunSlot>,
    config: SupervisorConfig,
}

impl Launcher {
    /// A launcher for the worker binary at `worker`.
    pub fn new(worker: impl Into<PathBuf>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            worker: worker.into(),
            spawner: Arc::new(CommandSpawner::new()),
            notifier,
            slot: Arc::new(RunSlot::new()),
            config: SupervisorConfig::default(),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn worker(&self) -> &Path {
        &self.worker
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn active(&self) -> Option<Arc<RunHandle>> {
        self.slot.active()
    }

    pub fn state(&self) -> RunState {
        self.slot.state()
    }

    pub fn is_idle(&self) -> bool {
        self.slot.is_idle()
    }

    /// Start a run for `job`.
    ///
    /// On any failure the slot is released before returning, so the
    /// supervisor is immediately idle again.
    pub async fn launch(&self, job: JobDescriptor) -> Result<Run, LaunchError> {
        let run = Arc::new(RunHandle::new(job));
        self.slot
            .acquire(Arc::clone(&run))
            .map_err(|occupied| LaunchError::AlreadyRunning {
                active: occupied.active,
            })?;

        match self.start(&run).await {
            Ok(monitor) => Ok(Run {
                handle: run,
                monitor,
            }),
            Err(e) => {
                run.advance(RunState::Terminated);
                self.slot.release(run.id());
                error!(run_id = %run.id(), error = %e, "failed to launch worker");
                Err(e)
            }
        }
    }

    async fn start(&self, run: &Arc<RunHandle>) -> Result<JoinHandle<Outcome>, LaunchError> {
        let job = run.job();
        if !job.archive().is_file() {
            return Err(LaunchError::ArchiveMissing(job.archive().to_path_buf()));
        }
        if let Some(skip) = job.skip_list() {
            shutdown::clear_stale_flag(skip.stop_flag_path()).await;
        }

        let command = WorkerCommand::for_job(&self.worker, job);
        let spawned = self
            .spawner
            .spawn(&command)
            .await
            .map_err(|source| match source.kind() {
                io::ErrorKind::NotFound => LaunchError::ExecutableNotFound {
                    path: command.program.clone(),
                    source,
                },
                _ => LaunchError::OsLaunchFailure {
                    path: command.program.clone(),
                    source,
                },
            })?;

        run.attach(spawned.process).await;
        info!(
            run_id = %run.id(),
            pid = ?run.pid(),
            spawner = self.spawner.name(),
            program = %command.program.display(),
            "worker started"
        );

        let router = OutputRouter::start(
            run,
            spawned.stdout,
            spawned.stderr,
            Arc::clone(&self.notifier),
        );
        let monitor = Monitor {
            run: Arc::clone(run),
            router,
            slot: Arc::clone(&self.slot),
            notifier: Arc::clone(&self.notifier),
            config: self.config.clone(),
        };
        Ok(tokio::spawn(monitor.run()))
    }

    /// Stop the active run, if any.
    ///
    /// Returns `None` when there is nothing to stop. Completion of the
    /// stop does not mean the outcome has been emitted yet; await
    /// [`Run::wait`] for that.
    pub async fn stop(&self) -> Option<StopReport> {
        let run = self.slot.active()?;
        Some(shutdown::stop(&run, &self.config).await)
    }

    /// Kill the active run at once and remove its stop flag. Returns
    /// `false` when there was no run.
    pub async fn force_stop(&self) -> bool {
        match self.slot.active() {
            Some(run) => {
                shutdown::force_stop(&run).await;
                true
            }
            None => false,
        }
    }

    /// Delete the skip list at `path`. Refused while a run is active.
    pub fn clear_skip_list(&self, path: &Path) -> Result<ClearResult, SkipListError> {
        if !self.slot.is_idle() {
            return Err(SkipListError::RunActive);
        }
        skip_list::clear_skip_list(path)
    }
}

/// A launched run.
#[derive(Debug)]
pub struct Run {
    handle: Arc<RunHandle>,
    monitor: JoinHandle<Outcome>,
}

impl Run {
    pub fn handle(&self) -> &Arc<RunHandle> {
        &self.handle
    }

    pub fn id(&self) -> Uuid {
        self.handle.id()
    }

    /// Wait for the monitor to finish teardown and return the outcome it
    /// emitted.
    pub async fn wait(self) -> Outcome {
        match self.monitor.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(run_id = %self.handle.id(), error = %e, "lifecycle monitor failed");
                Outcome::AbnormalTermination {
                    code: exit_code::POLL_FAILURE,
                }
            }
        }
    }
}
