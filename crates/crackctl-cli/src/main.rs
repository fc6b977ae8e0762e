mod config;
mod render;
mod run_cmd;
#[cfg(test)]
mod test_util;

use std::path::Path;

use clap::{Parser, Subcommand};

use crackctl_core::skip_list::{self, ClearResult};

use config::{CliOverrides, CrackctlConfig};

#[derive(Parser)]
#[command(
    name = "crackctl",
    version,
    about = "Supervise an archive password search worker"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a crackctl config file with every default spelled out
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Launch the worker and stream its progress until it finishes
    Run(run_cmd::RunArgs),
    /// Delete the skip list so the next run starts from scratch
    ClearSkipList {
        /// Skip-list file (overrides CRACKCTL_SKIP_FILE)
        #[arg(long)]
        skip_file: Option<std::path::PathBuf>,
    },
}

fn cmd_init(force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let cfg = config::initial_config()?;
    config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    if let Some(worker) = &cfg.worker.binary {
        println!("  worker.binary = {}", worker.display());
    }
    if let Some(skip) = &cfg.worker.skip_file {
        println!("  worker.skip_file = {}", skip.display());
    }

    Ok(())
}

fn cmd_clear_skip_list(skip_file: Option<&Path>) -> anyhow::Result<()> {
    let resolved = CrackctlConfig::resolve(&CliOverrides {
        skip_file: skip_file.map(Path::to_path_buf),
        ..CliOverrides::default()
    })?;

    match skip_list::clear_skip_list(&resolved.skip_file)? {
        ClearResult::Removed => println!("Skip list removed: {}", resolved.skip_file.display()),
        ClearResult::NotPresent => {
            println!("No skip list at {}", resolved.skip_file.display())
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { force } => {
            cmd_init(force)?;
        }
        Commands::Run(args) => {
            let status = run_cmd::run(args).await?;
            if status != 0 {
                std::process::exit(status);
            }
        }
        Commands::ClearSkipList { skip_file } => {
            cmd_clear_skip_list(skip_file.as_deref())?;
        }
    }

    Ok(())
}
