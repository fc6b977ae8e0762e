//! Shared test utilities for crackctl integration tests.
//!
//! Two ways to stand in for the real worker:
//! - **[`FakeSpawner`]**: a scripted, in-process worker whose timeline runs
//!   on the tokio clock, so stop-protocol tests can use paused time.
//! - **[`write_script`]** (Unix): a real `/bin/sh` script, for tests that
//!   need genuine pipes, working directories and signals.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crackctl_core::notify::{Event, Notification, Notifier};
use crackctl_core::outcome::Outcome;
use crackctl_core::shutdown::StopSignal;
use crackctl_core::worker::{SpawnedWorker, Spawner, WorkerCommand, WorkerProcess};

/// Exit code a fake reports after honouring a terminate.
pub const TERMINATED_CODE: i32 = -15;
/// Exit code a fake reports after a kill.
pub const KILLED_CODE: i32 = -9;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Create a placeholder archive file named `name` in `dir`.
pub fn archive(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"not really an archive").expect("failed to write archive fixture");
    path
}

/// Write an executable shell script to `dir/name`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("failed to write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("failed to chmod script");
    path
}

// ---------------------------------------------------------------------------
// Recording notifier
// ---------------------------------------------------------------------------

/// Notifier that keeps every notification in arrival order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().expect("recorder poisoned").clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Event(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Outcome(o) => Some(o),
                _ => None,
            })
            .collect()
    }

    fn push(&self, n: Notification) {
        self.seen.lock().expect("recorder poisoned").push(n);
    }
}

impl Notifier for RecordingNotifier {
    fn on_event(&self, event: Event) {
        self.push(Notification::Event(event));
    }

    fn on_outcome(&self, outcome: Outcome) {
        self.push(Notification::Outcome(outcome));
    }

    fn on_idle(&self) {
        self.push(Notification::Idle);
    }
}

// ---------------------------------------------------------------------------
// Fake worker
// ---------------------------------------------------------------------------

/// Scripted behaviour of one fake worker.
#[derive(Debug, Clone)]
pub struct FakeBehavior {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit on its own this long after spawn.
    pub exit_after: Option<Duration>,
    pub exit_code: i32,
    /// Exit with `exit_code` this long after the run's stop flag appears.
    pub flag_response: Option<Duration>,
    pub honors_terminate: bool,
    /// Every `try_wait` fails.
    pub poll_error: bool,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_after: None,
            exit_code: 1,
            flag_response: None,
            honors_terminate: true,
            poll_error: false,
        }
    }
}

impl FakeBehavior {
    /// Print `stdout` and exit with `code` after `after`.
    pub fn exits(code: i32, after: Duration, stdout: &str) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            exit_after: Some(after),
            exit_code: code,
            ..Self::default()
        }
    }

    /// Never exits on its own.
    pub fn hangs() -> Self {
        Self::default()
    }
}

/// Signals delivered to fakes, with the time since spawn.
pub type SignalLog = Arc<Mutex<Vec<(StopSignal, Duration)>>>;

struct FakeWorker {
    behavior: FakeBehavior,
    stop_flag: Option<PathBuf>,
    started: Instant,
    flag_seen: Option<Instant>,
    exited: Option<i32>,
    signals: SignalLog,
}

impl FakeWorker {
    fn record(&self, signal: StopSignal) {
        self.signals
            .lock()
            .expect("signal log poisoned")
            .push((signal, self.started.elapsed()));
    }
}

impl WorkerProcess for FakeWorker {
    fn id(&self) -> Option<u32> {
        self.exited.is_none().then_some(4242)
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        if let Some(code) = self.exited {
            return Ok(Some(code));
        }
        if self.behavior.poll_error {
            return Err(io::Error::other("injected poll failure"));
        }

        let now = Instant::now();
        if let Some(after) = self.behavior.exit_after {
            if now.duration_since(self.started) >= after {
                self.exited = Some(self.behavior.exit_code);
            }
        }
        if let (Some(flag), Some(response)) = (&self.stop_flag, self.behavior.flag_response) {
            if self.flag_seen.is_none() && flag.exists() {
                self.flag_seen = Some(now);
            }
            if let Some(seen) = self.flag_seen {
                if now.duration_since(seen) >= response {
                    self.exited.get_or_insert(self.behavior.exit_code);
                }
            }
        }
        Ok(self.exited)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.record(StopSignal::Terminate);
        if self.behavior.honors_terminate && self.exited.is_none() {
            self.exited = Some(TERMINATED_CODE);
        }
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.record(StopSignal::Kill);
        if self.exited.is_none() {
            self.exited = Some(KILLED_CODE);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fake spawner
// ---------------------------------------------------------------------------

/// Spawner that hands out scripted [`FakeBehavior`]s in order.
///
/// When the queue is empty, `spawn` fails with `failure` (default
/// `NotFound`).
#[derive(Debug)]
pub struct FakeSpawner {
    queue: Mutex<VecDeque<FakeBehavior>>,
    failure: io::ErrorKind,
    commands: Mutex<Vec<WorkerCommand>>,
    signals: SignalLog,
}

impl FakeSpawner {
    pub fn new(behaviors: impl IntoIterator<Item = FakeBehavior>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(behaviors.into_iter().collect()),
            failure: io::ErrorKind::NotFound,
            commands: Mutex::new(Vec::new()),
            signals: SignalLog::default(),
        })
    }

    /// A spawner whose every spawn fails with `kind`.
    pub fn failing(kind: io::ErrorKind) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(VecDeque::new()),
            failure: kind,
            commands: Mutex::new(Vec::new()),
            signals: SignalLog::default(),
        })
    }

    /// Commands passed to `spawn`, including failed ones.
    pub fn commands(&self) -> Vec<WorkerCommand> {
        self.commands.lock().expect("command log poisoned").clone()
    }

    pub fn signals(&self) -> Vec<(StopSignal, Duration)> {
        self.signals.lock().expect("signal log poisoned").clone()
    }
}

#[async_trait]
impl Spawner for FakeSpawner {
    fn name(&self) -> &str {
        "fake"
    }

    async fn spawn(&self, command: &WorkerCommand) -> io::Result<SpawnedWorker> {
        self.commands
            .lock()
            .expect("command log poisoned")
            .push(command.clone());

        let behavior = self.queue.lock().expect("queue poisoned").pop_front();
        let Some(behavior) = behavior else {
            return Err(io::Error::new(self.failure, "fake spawn failure"));
        };

        let stop_flag = stop_flag_from_args(command);
        let stdout = io::Cursor::new(behavior.stdout.clone());
        let stderr = io::Cursor::new(behavior.stderr.clone());
        Ok(SpawnedWorker {
            process: Box::new(FakeWorker {
                behavior,
                stop_flag,
                started: Instant::now(),
                flag_seen: None,
                exited: None,
                signals: Arc::clone(&self.signals),
            }),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }
}

/// `<skip-file>.stop`, if the command carries `--skip-file`.
fn stop_flag_from_args(command: &WorkerCommand) -> Option<PathBuf> {
    let pos = command.args.iter().position(|a| a == "--skip-file")?;
    let skip = command.args.get(pos + 1)?;
    Some(crackctl_core::job::stop_flag_path(Path::new(skip)))
}
