//! Configuration file management for crackctl.
//!
//! Provides a TOML-based config file at `~/.config/crackctl/config.toml` and
//! a resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crackctl_core::SupervisorConfig;
use crackctl_core::job::DEFAULT_CHECKPOINT_INTERVAL_SECS;

/// File name of the bundled worker, without the platform suffix.
pub const WORKER_NAME: &str = "ArchivePasswordCrackerCLI";

/// Skip-list file name, placed next to the worker by default.
pub const SKIP_LIST_NAME: &str = "skip_list.bf";

pub const WORKER_ENV: &str = "CRACKCTL_WORKER";
pub const SKIP_FILE_ENV: &str = "CRACKCTL_SKIP_FILE";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub timings: TimingsSection,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerSection {
    /// Path to the worker executable.
    pub binary: Option<PathBuf>,
    /// Path to the skip-list file.
    pub skip_file: Option<PathBuf>,
    /// Seconds between skip-list checkpoints.
    pub checkpoint_interval: Option<u32>,
}

/// Timing overrides, all in milliseconds.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingsSection {
    pub poll_interval_ms: Option<u64>,
    pub exit_grace_ms: Option<u64>,
    pub reader_join_timeout_ms: Option<u64>,
    pub dispatch_drain_timeout_ms: Option<u64>,
    pub stop_grace_ms: Option<u64>,
    pub stop_poll_interval_ms: Option<u64>,
    pub terminate_wait_ms: Option<u64>,
    pub kill_wait_ms: Option<u64>,
}

impl TimingsSection {
    /// Every value spelled out, for a freshly written config file.
    fn explicit(cfg: &SupervisorConfig) -> Self {
        let ms = |d: Duration| Some(d.as_millis() as u64);
        Self {
            poll_interval_ms: ms(cfg.poll_interval),
            exit_grace_ms: ms(cfg.exit_grace),
            reader_join_timeout_ms: ms(cfg.reader_join_timeout),
            dispatch_drain_timeout_ms: ms(cfg.dispatch_drain_timeout),
            stop_grace_ms: ms(cfg.stop_grace),
            stop_poll_interval_ms: ms(cfg.stop_poll_interval),
            terminate_wait_ms: ms(cfg.terminate_wait),
            kill_wait_ms: ms(cfg.kill_wait),
        }
    }

    fn apply(&self, mut cfg: SupervisorConfig) -> SupervisorConfig {
        let set = |slot: &mut Duration, ms: Option<u64>| {
            if let Some(ms) = ms {
                *slot = Duration::from_millis(ms);
            }
        };
        set(&mut cfg.poll_interval, self.poll_interval_ms);
        set(&mut cfg.exit_grace, self.exit_grace_ms);
        set(&mut cfg.reader_join_timeout, self.reader_join_timeout_ms);
        set(&mut cfg.dispatch_drain_timeout, self.dispatch_drain_timeout_ms);
        set(&mut cfg.stop_grace, self.stop_grace_ms);
        set(&mut cfg.stop_poll_interval, self.stop_poll_interval_ms);
        set(&mut cfg.terminate_wait, self.terminate_wait_ms);
        set(&mut cfg.kill_wait, self.kill_wait_ms);
        cfg
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the crackctl config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/crackctl` or
/// `~/.config/crackctl`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("crackctl");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("crackctl")
}

/// Return the path to the crackctl config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// `<dir of this executable>/helpers/ArchivePasswordCrackerCLI[.exe]`.
pub fn default_worker_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to locate the crackctl executable")?;
    let dir = exe.parent().unwrap_or_else(|| Path::new("."));
    Ok(dir
        .join("helpers")
        .join(format!("{WORKER_NAME}{}", std::env::consts::EXE_SUFFIX)))
}

/// `skip_list.bf` in the worker's directory.
pub fn default_skip_file(worker: &Path) -> PathBuf {
    worker
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(SKIP_LIST_NAME)
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file, if there is one.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// The config `crackctl init` writes: every default made explicit.
pub fn initial_config() -> Result<ConfigFile> {
    let worker = default_worker_path()?;
    Ok(ConfigFile {
        worker: WorkerSection {
            skip_file: Some(default_skip_file(&worker)),
            binary: Some(worker),
            checkpoint_interval: Some(DEFAULT_CHECKPOINT_INTERVAL_SECS),
        },
        timings: TimingsSection::explicit(&SupervisorConfig::default()),
    })
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Values passed on the command line; `None` means "not given".
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub worker: Option<PathBuf>,
    pub skip_file: Option<PathBuf>,
    pub checkpoint_interval: Option<u32>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct CrackctlConfig {
    pub worker: PathBuf,
    pub skip_file: PathBuf,
    pub checkpoint_interval: u32,
    pub supervisor: SupervisorConfig,
}

impl CrackctlConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - Worker: `--worker` > `CRACKCTL_WORKER` > `worker.binary` > next to this executable
    /// - Skip list: `--skip-file` > `CRACKCTL_SKIP_FILE` > `worker.skip_file` > next to the worker
    /// - Checkpoint interval: `--checkpoint-interval` > `worker.checkpoint_interval` > 10 s
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file = load_config()?;
        Self::resolve_with(cli, file.unwrap_or_default())
    }

    fn resolve_with(cli: &CliOverrides, file: ConfigFile) -> Result<Self> {
        let worker = match cli.worker.clone() {
            Some(path) => path,
            None => match std::env::var_os(WORKER_ENV) {
                Some(path) => PathBuf::from(path),
                None => match file.worker.binary {
                    Some(path) => path,
                    None => default_worker_path()?,
                },
            },
        };

        let skip_file = cli
            .skip_file
            .clone()
            .or_else(|| std::env::var_os(SKIP_FILE_ENV).map(PathBuf::from))
            .or(file.worker.skip_file)
            .unwrap_or_else(|| default_skip_file(&worker));

        let checkpoint_interval = cli
            .checkpoint_interval
            .or(file.worker.checkpoint_interval)
            .unwrap_or(DEFAULT_CHECKPOINT_INTERVAL_SECS);

        Ok(Self {
            worker,
            skip_file,
            checkpoint_interval,
            supervisor: file.timings.apply(SupervisorConfig::default()),
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
