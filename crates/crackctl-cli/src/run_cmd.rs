//! `crackctl run`: launch one search and stream its progress.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crackctl_core::notify::Notification;
use crackctl_core::{ChannelNotifier, JobDescriptor, Launcher, SearchOrder};

use crate::config::{CliOverrides, CrackctlConfig};
use crate::render::{self, Format};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Characters to build candidates from
    #[arg(long)]
    pub charset: String,
    /// Minimum candidate length (required unless --pattern is given)
    #[arg(long, required_unless_present = "pattern")]
    pub min: Option<u32>,
    /// Maximum candidate length (required unless --pattern is given)
    #[arg(long, required_unless_present = "pattern")]
    pub max: Option<u32>,
    /// Mask: `?` is one charset character, `*` any run, `\` escapes
    #[arg(long)]
    pub pattern: Option<String>,
    /// Archive to unlock
    #[arg(long)]
    pub archive: PathBuf,
    /// Enumeration order: ascending, descending or random
    #[arg(long, default_value_t = SearchOrder::Ascending)]
    pub order: SearchOrder,
    /// Do not persist progress to a skip list
    #[arg(long)]
    pub no_skip_list: bool,
    /// Worker executable (overrides CRACKCTL_WORKER)
    #[arg(long)]
    pub worker: Option<PathBuf>,
    /// Skip-list file (overrides CRACKCTL_SKIP_FILE)
    #[arg(long)]
    pub skip_file: Option<PathBuf>,
    /// Seconds between skip-list checkpoints
    #[arg(long)]
    pub checkpoint_interval: Option<u32>,
    /// Emit notifications as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            worker: self.worker.clone(),
            skip_file: self.skip_file.clone(),
            checkpoint_interval: self.checkpoint_interval,
        }
    }

    fn job(&self, config: &CrackctlConfig) -> Result<JobDescriptor> {
        let job = match &self.pattern {
            Some(pattern) => JobDescriptor::pattern(
                &self.charset,
                pattern,
                self.min,
                self.max,
                &self.archive,
                self.order,
            ),
            None => JobDescriptor::lengths(
                &self.charset,
                self.min.unwrap_or_default(),
                self.max.unwrap_or_default(),
                &self.archive,
                self.order,
            ),
        }
        .context("invalid job parameters")?;

        Ok(if self.no_skip_list {
            job
        } else {
            job.with_skip_list(&config.skip_file, Some(config.checkpoint_interval))
        })
    }
}

/// Run a search to completion. Returns the process exit status.
pub async fn run(args: RunArgs) -> Result<i32> {
    let config = CrackctlConfig::resolve(&args.overrides())?;
    let job = args.job(&config)?;
    let format = if args.json { Format::Json } else { Format::Text };

    let (notifier, mut rx) = ChannelNotifier::new();
    let launcher = Arc::new(
        Launcher::new(&config.worker, Arc::new(notifier)).with_config(config.supervisor.clone()),
    );
    let run = launcher
        .launch(job)
        .await
        .with_context(|| format!("failed to launch worker {}", config.worker.display()))?;
    info!(run_id = %run.id(), "search started");

    // First Ctrl+C stops the worker gracefully; a second one exits at once.
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    let got_first_signal = Arc::new(AtomicBool::new(false));
    let got_first_clone = Arc::clone(&got_first_signal);
    let launcher_clone = Arc::clone(&launcher);
    tokio::spawn(async move {
        loop {
            tokio::signal::ctrl_c().await.ok();
            if got_first_clone.swap(true, Ordering::SeqCst) {
                eprintln!("\nForce exit.");
                // process::exit skips destructors, so kill_on_drop never fires.
                launcher_clone.force_stop().await;
                std::process::exit(130);
            }
            eprintln!("\nStopping worker (Ctrl+C again to force)...");
            cancel_clone.cancel();
        }
    });

    let stopper = {
        let launcher = Arc::clone(&launcher);
        tokio::spawn(async move {
            cancel.cancelled().await;
            if let Some(report) = launcher.stop().await {
                info!(
                    escalation = ?report.escalation,
                    signals = ?report.signals,
                    "stop finished"
                );
            }
        })
    };

    let mut stdout = std::io::stdout();
    while let Some(notification) = rx.recv().await {
        render::render(&mut stdout, format, chrono::Local::now(), &notification)
            .context("failed to write output")?;
        if notification == Notification::Idle {
            break;
        }
    }

    let outcome = run.wait().await;
    stopper.abort();
    Ok(render::exit_status(&outcome))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn parse(args: &[&str]) -> Result<RunArgs, clap::Error> {
        Harness::try_parse_from(std::iter::once("run").chain(args.iter().copied())).map(|h| h.run)
    }

    fn config(dir: &std::path::Path) -> CrackctlConfig {
        CrackctlConfig {
            worker: dir.join("worker"),
            skip_file: dir.join("skip_list.bf"),
            checkpoint_interval: 15,
            supervisor: Default::default(),
        }
    }

    #[test]
    fn lengths_require_min_and_max() {
        assert!(parse(&["--charset", "ab", "--archive", "a.zip", "--min", "1"]).is_err());
        let args = parse(&[
            "--charset", "ab", "--archive", "a.zip", "--min", "1", "--max", "2",
        ])
        .unwrap();
        assert_eq!(args.order, SearchOrder::Ascending);
        assert!(!args.json);
    }

    #[test]
    fn pattern_makes_bounds_optional() {
        let args = parse(&[
            "--charset", "ab", "--archive", "a.zip", "--pattern", "a?c", "--order", "RANDOM",
        ])
        .unwrap();
        assert_eq!(args.pattern.as_deref(), Some("a?c"));
        assert_eq!(args.order, SearchOrder::Random);
    }

    #[test]
    fn job_uses_resolved_skip_list() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("a.zip");
        std::fs::write(&archive, b"pk").unwrap();
        let archive = archive.to_string_lossy().into_owned();

        let args = parse(&[
            "--charset", "ab", "--archive", &archive, "--min", "1", "--max", "2",
        ])
        .unwrap();
        let job = args.job(&config(tmp.path())).unwrap();
        let skip = job.skip_list().unwrap();
        assert_eq!(skip.path, tmp.path().join("skip_list.bf"));
        assert_eq!(skip.checkpoint_interval_secs, 15);

        let args = parse(&[
            "--charset", "ab", "--archive", &archive, "--min", "1", "--max", "2",
            "--no-skip-list",
        ])
        .unwrap();
        assert!(args.job(&config(tmp.path())).unwrap().skip_list().is_none());
    }

    #[test]
    fn invalid_bounds_are_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("a.zip");
        std::fs::write(&archive, b"pk").unwrap();
        let archive = archive.to_string_lossy().into_owned();

        let args = parse(&[
            "--charset", "ab", "--archive", &archive, "--min", "3", "--max", "2",
        ])
        .unwrap();
        let err = args.job(&config(tmp.path())).unwrap_err();
        assert!(format!("{err:#}").contains("cannot be greater than"));
    }
}
