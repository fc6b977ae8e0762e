//! Worker process abstraction.
//!
//! The supervisor never touches `tokio::process` directly. It goes through
//! a [`Spawner`], which hands back a [`SpawnedWorker`]: a
//! [`WorkerProcess`] control handle plus the two output pipes. The real
//! implementation lives in [`process`]; tests substitute a scripted one.

pub mod process;

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::job::JobDescriptor;

pub use process::{CommandSpawner, OsWorker};

/// Boxed read half of one worker output pipe.
pub type OutputPipe = Box<dyn AsyncRead + Send + Unpin>;

/// Control handle for a running worker.
///
/// All methods are non-blocking. `try_wait` reports the exit code once the
/// process has exited; on Unix a death by signal `N` is reported as `-N`.
pub trait WorkerProcess: Send {
    /// OS process id, while the process has not been reaped.
    fn id(&self) -> Option<u32>;

    fn try_wait(&mut self) -> io::Result<Option<i32>>;

    /// Graceful termination request (SIGTERM on Unix).
    fn terminate(&mut self) -> io::Result<()>;

    /// Forced termination (SIGKILL on Unix).
    fn kill(&mut self) -> io::Result<()>;
}

/// A freshly spawned worker and its captured output.
pub struct SpawnedWorker {
    pub process: Box<dyn WorkerProcess>,
    pub stdout: OutputPipe,
    pub stderr: OutputPipe,
}

/// Fully resolved command line for one worker invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Always the directory containing `program`.
    pub working_dir: PathBuf,
}

impl WorkerCommand {
    /// Build the invocation of `program` for `job`.
    ///
    /// The program path is made absolute when possible: the child runs in
    /// the program's own directory, where a relative path would no longer
    /// resolve.
    pub fn for_job(program: &Path, job: &JobDescriptor) -> Self {
        let program = std::fs::canonicalize(program).unwrap_or_else(|_| program.to_path_buf());
        let working_dir = match program.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self {
            program,
            args: job.worker_args(),
            working_dir,
        }
    }
}

/// Starts worker processes.
///
/// # Object Safety
///
/// Object-safe so the launcher can hold an `Arc<dyn Spawner>`.
#[async_trait]
pub trait Spawner: Send + Sync {
    /// Short name for logs (e.g. "os").
    fn name(&self) -> &str;

    /// Start the worker described by `command` with both output channels
    /// captured.
    async fn spawn(&self, command: &WorkerCommand) -> io::Result<SpawnedWorker>;
}

// Compile-time assertion: Spawner must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Spawner) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SearchOrder;

    #[test]
    fn working_dir_is_program_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("secret.7z");
        std::fs::write(&archive, b"7z").unwrap();
        let bin_dir = tmp.path().join("helpers");
        std::fs::create_dir(&bin_dir).unwrap();
        let program = bin_dir.join("worker");
        std::fs::write(&program, b"").unwrap();

        let job = JobDescriptor::lengths("abc", 1, 3, &archive, SearchOrder::Random).unwrap();
        let cmd = WorkerCommand::for_job(&program, &job);

        assert_eq!(cmd.working_dir, std::fs::canonicalize(&bin_dir).unwrap());
        assert!(cmd.program.is_absolute());
        assert_eq!(cmd.args[0], "abc");
        assert_eq!(cmd.args[4], "random");
    }

    #[test]
    fn missing_program_keeps_given_path() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("a.zip");
        std::fs::write(&archive, b"pk").unwrap();
        let job = JobDescriptor::lengths("a", 1, 1, &archive, SearchOrder::Ascending).unwrap();

        let cmd = WorkerCommand::for_job(Path::new("no-such-worker"), &job);
        assert_eq!(cmd.program, PathBuf::from("no-such-worker"));
        assert_eq!(cmd.working_dir, PathBuf::from("."));
    }
}
