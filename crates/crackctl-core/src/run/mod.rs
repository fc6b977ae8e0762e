//! The run handle: shared state for one in-flight worker execution.
//!
//! Lifecycle of a handle:
//!
//! ```text
//! Launching -> Running -> Stopping -> Terminated
//!     |           |                      ^
//!     |           +----------------------+   (natural exit)
//!     +----------------------------------+   (spawn failed)
//! ```
//!
//! `Idle` is what [`RunSlot::state`] reports when no handle exists.

pub mod slot;

use std::fmt;
use std::io;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::job::JobDescriptor;
use crate::worker::WorkerProcess;

pub use slot::{RunSlot, SlotOccupied};

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Launching = 1,
    Running = 2,
    Stopping = 3,
    Terminated = 4,
}

impl RunState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Launching,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Terminated,
            _ => Self::Idle,
        }
    }

    /// Whether `self -> to` is an edge of the lifecycle graph.
    pub fn can_advance_to(self, to: RunState) -> bool {
        matches!(
            (self, to),
            (Self::Launching, Self::Running)
                | (Self::Launching, Self::Terminated)
                | (Self::Running, Self::Stopping)
                | (Self::Running, Self::Terminated)
                | (Self::Stopping, Self::Terminated)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Launching => "launching",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// One in-flight execution of the worker.
///
/// Shared between the launcher, both reader tasks, the lifecycle monitor
/// and the shutdown controller. The found result and the stop flag are
/// first-writer-wins; the state only moves forward.
pub struct RunHandle {
    id: Uuid,
    job: JobDescriptor,
    state: AtomicU8,
    found_result: OnceLock<String>,
    user_requested_stop: AtomicBool,
    pid: OnceLock<u32>,
    /// `None` until the process is attached after a successful spawn.
    process: Mutex<Option<Box<dyn WorkerProcess>>>,
}

impl fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("pid", &self.pid())
            .field("found_result", &self.found_result.get().is_some())
            .field("user_requested_stop", &self.stop_requested())
            .finish()
    }
}

impl RunHandle {
    pub fn new(job: JobDescriptor) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            state: AtomicU8::new(RunState::Launching as u8),
            found_result: OnceLock::new(),
            user_requested_stop: AtomicBool::new(false),
            pid: OnceLock::new(),
            process: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job(&self) -> &JobDescriptor {
        &self.job
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid.get().copied()
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `to` if that is a forward edge from the current state.
    ///
    /// Returns `false` (and changes nothing) otherwise, including when
    /// another caller got there first.
    pub fn advance(&self, to: RunState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if !RunState::from_u8(current).can_advance_to(to) {
                return false;
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Store the discovered password. Only the first call has an effect.
    pub fn record_result(&self, password: impl Into<String>) -> bool {
        self.found_result.set(password.into()).is_ok()
    }

    pub fn found_result(&self) -> Option<&str> {
        self.found_result.get().map(String::as_str)
    }

    /// Mark the run as stopped on user request. Only the first call
    /// returns `true`.
    pub fn request_stop(&self) -> bool {
        !self.user_requested_stop.swap(true, Ordering::AcqRel)
    }

    pub fn stop_requested(&self) -> bool {
        self.user_requested_stop.load(Ordering::Acquire)
    }

    /// Attach the spawned process and enter `Running`.
    pub(crate) async fn attach(&self, process: Box<dyn WorkerProcess>) {
        if let Some(pid) = process.id() {
            let _ = self.pid.set(pid);
        }
        *self.process.lock().await = Some(process);
        self.advance(RunState::Running);
    }

    /// Non-blocking exit check. `Ok(None)` while running or before a
    /// process is attached.
    pub async fn poll_exit(&self) -> io::Result<Option<i32>> {
        match self.process.lock().await.as_mut() {
            Some(process) => process.try_wait(),
            None => Ok(None),
        }
    }

    pub async fn terminate(&self) -> io::Result<()> {
        match self.process.lock().await.as_mut() {
            Some(process) => process.terminate(),
            None => Ok(()),
        }
    }

    pub async fn kill(&self) -> io::Result<()> {
        match self.process.lock().await.as_mut() {
            Some(process) => process.kill(),
            None => Ok(()),
        }
    }
}
