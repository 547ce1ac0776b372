//! cloudburstd: the cloudburst daemon.
//!
//! Watches CPU, memory, and disk usage of the local host and, the first time
//! any of them crosses its threshold, provisions a Compute Engine instance,
//! deploys the configured workload to it, and records that it did so.
//!
//! # Usage
//!
//! ```text
//! cloudburstd init --project my-project --workload ./sample-app
//! cloudburstd check
//! cloudburstd run --config cloudburst.toml --log-file auto_scale.log
//! cloudburstd status
//! ```

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;

const DEFAULT_FILTER: &str = "info,cloudburst=debug";

#[derive(Parser)]
#[command(
    name = "cloudburstd",
    about = "Burst a workload to the cloud when local resources run out",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Monitor resources and scale out once on the first breach.
    Run {
        #[arg(short, long, default_value = "cloudburst.toml")]
        config: PathBuf,

        /// Directory holding the state record (overrides [state].dir).
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Also write logs to this file.
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Print the persisted state record and instance descriptor.
    Status {
        #[arg(short, long, default_value = "cloudburst.toml")]
        config: PathBuf,

        #[arg(long)]
        state_dir: Option<PathBuf>,
    },
    /// Write a scaffold config file.
    Init {
        #[arg(short, long, default_value = "cloudburst.toml")]
        path: PathBuf,

        /// GCP project to provision into.
        #[arg(long, default_value = "")]
        project: String,

        /// Local directory deployed to the instance.
        #[arg(long, default_value = "sample-app")]
        workload: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Take one resource sample and report threshold breaches without scaling.
    Check {
        #[arg(short, long, default_value = "cloudburst.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_file = match &cli.command {
        Command::Run { log_file, .. } => log_file.as_deref(),
        _ => None,
    };
    init_tracing(log_file)?;

    match cli.command {
        Command::Run {
            config,
            state_dir,
            log_file: _,
        } => commands::run::run(&config, state_dir).await,
        Command::Status { config, state_dir } => commands::status::status(&config, state_dir),
        Command::Init {
            path,
            project,
            workload,
            force,
        } => commands::init::init(&path, &project, &workload, force),
        Command::Check { config } => commands::check::check(&config).await,
    }
}

/// Console logging filtered by `RUST_LOG`, plus a plain-text file layer when requested.
fn init_tracing(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_overrides() {
        let cli = Cli::try_parse_from([
            "cloudburstd",
            "run",
            "--config",
            "/etc/cloudburst.toml",
            "--state-dir",
            "/var/lib/cloudburst",
            "--log-file",
            "auto_scale.log",
        ])
        .unwrap();
        match cli.command {
            Command::Run {
                config,
                state_dir,
                log_file,
            } => {
                assert_eq!(config, PathBuf::from("/etc/cloudburst.toml"));
                assert_eq!(state_dir, Some(PathBuf::from("/var/lib/cloudburst")));
                assert_eq!(log_file, Some(PathBuf::from("auto_scale.log")));
            }
            _ => panic!("expected run"),
        }
    }
}
