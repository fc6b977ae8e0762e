//! OS-backed worker processes via `tokio::process`.

use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use super::{SpawnedWorker, Spawner, WorkerCommand, WorkerProcess};

/// Suppresses the console window for the child on Windows.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Spawns the real worker binary.
#[derive(Debug, Clone, Default)]
pub struct CommandSpawner;

impl CommandSpawner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Spawner for CommandSpawner {
    fn name(&self) -> &str {
        "os"
    }

    async fn spawn(&self, command: &WorkerCommand) -> io::Result<SpawnedWorker> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .current_dir(&command.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        debug!(
            program = %command.program.display(),
            cwd = %command.working_dir.display(),
            args = ?command.args,
            "spawning worker"
        );

        let mut child = cmd.spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("worker stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("worker stderr was not captured"))?;

        Ok(SpawnedWorker {
            process: Box::new(OsWorker {
                child,
                program: command.program.clone(),
            }),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        })
    }
}

/// A worker running as a real child process.
#[derive(Debug)]
pub struct OsWorker {
    child: Child,
    program: PathBuf,
}

impl WorkerProcess for OsWorker {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> io::Result<()> {
        // No pid means the child has already been reaped.
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        debug!(pid, program = %self.program.display(), "sending SIGTERM");
        // SAFETY: pid is a child we spawned and have not yet reaped, so it
        // cannot have been recycled for another process.
        let ret = unsafe { libc::kill(pid, libc::SIGTERM) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> io::Result<()> {
        debug!(program = %self.program.display(), "terminating worker");
        self.child.start_kill()
    }

    fn kill(&mut self) -> io::Result<()> {
        debug!(program = %self.program.display(), "killing worker");
        self.child.start_kill()
    }
}

/// Exit code, or `-signal` for a signal death on Unix.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn script(dir: &std::path::Path, body: &str) -> PathBuf {
        let path = dir.join("worker.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn command(program: PathBuf, args: &[&str]) -> WorkerCommand {
        let working_dir = program.parent().unwrap().to_path_buf();
        WorkerCommand {
            program,
            args: args.iter().map(Into::into).collect(),
            working_dir,
        }
    }

    async fn wait_exit(worker: &mut dyn WorkerProcess) -> i32 {
        for _ in 0..200 {
            if let Some(code) = worker.try_wait().unwrap() {
                return code;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("worker did not exit");
    }

    #[tokio::test]
    async fn captures_both_channels_and_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "echo out; echo err >&2; exit 3");
        let mut spawned = CommandSpawner::new()
            .spawn(&command(program, &[]))
            .await
            .unwrap();

        let mut out = String::new();
        spawned.stdout.read_to_string(&mut out).await.unwrap();
        let mut err = String::new();
        spawned.stderr.read_to_string(&mut err).await.unwrap();

        assert_eq!(out, "out\n");
        assert_eq!(err, "err\n");
        assert_eq!(wait_exit(spawned.process.as_mut()).await, 3);
    }

    #[tokio::test]
    async fn terminate_reports_negative_signal() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "exec sleep 30");
        let mut spawned = CommandSpawner::new()
            .spawn(&command(program, &[]))
            .await
            .unwrap();

        assert!(spawned.process.id().is_some());
        spawned.process.terminate().unwrap();
        assert_eq!(wait_exit(spawned.process.as_mut()).await, -libc::SIGTERM);
    }

    #[tokio::test]
    async fn kill_reports_sigkill() {
        let tmp = tempfile::tempdir().unwrap();
        let program = script(tmp.path(), "trap '' TERM; exec sleep 30");
        let mut spawned = CommandSpawner::new()
            .spawn(&command(program, &[]))
            .await
            .unwrap();

        spawned.process.kill().unwrap();
        assert_eq!(wait_exit(spawned.process.as_mut()).await, -libc::SIGKILL);
    }

    #[tokio::test]
    async fn missing_binary_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let cmd = command(tmp.path().join("absent"), &[]);
        let err = CommandSpawner::new().spawn(&cmd).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
