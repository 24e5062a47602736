//! Stakeout CLI - stakeout command

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;

mod cmd;
mod system_config;

/// Stakeout - Breakpoint proxy for remote debuggees
#[derive(Parser)]
#[command(name = "stakeout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: $CONFIG_DIR/stakeout/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// View or edit configuration
    #[command(subcommand)]
    Config(ConfigCommands),
    /// Set breakpoints on a simulated debuggee and watch them resolve
    Simulate {
        /// Breakpoint location as path:line[:column] (repeatable)
        #[arg(long = "at", required = true)]
        locations: Vec<String>,
        /// Set logpoints with this message format instead of snapshots
        #[arg(long)]
        log: Option<String>,
        /// Seed for the simulated agent
        #[arg(long)]
        seed: Option<u64>,
        /// Give up after this many seconds (default: 60)
        #[arg(long, default_value = "60")]
        timeout: u64,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show every configuration value
    List,
    /// Print one value, e.g. proxy.concurrency
    Get {
        key: String,
    },
    /// Change one value and save the file
    Set {
        key: String,
        value: String,
    },
    /// Print the config file location
    Path {
        /// Create the file with defaults if it is missing
        #[arg(long)]
        create: bool,
    },
    /// Print an annotated example configuration
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => system_config::config_file_path().context("Could not determine config file path")?,
    };
    let config = system_config::load(&config_path)?;
    let _guard = init_tracing(&config, cli.verbose)?;

    match cli.command {
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::List => cmd::config::run_list(&config_path).await,
            ConfigCommands::Get { key } => cmd::config::run_get(&config_path, &key).await,
            ConfigCommands::Set { key, value } => cmd::config::run_set(&config_path, &key, &value).await,
            ConfigCommands::Path { create } => cmd::config::run_path(&config_path, create).await,
            ConfigCommands::Example => cmd::config::run_example().await,
        },
        Commands::Simulate { locations, log, seed, timeout } => {
            let args = cmd::simulate::SimulateArgs {
                locations,
                log_format: log,
                seed,
                timeout: Duration::from_secs(timeout),
            };
            cmd::simulate::run(&config, args).await
        }
    }
}

/// Install the fmt subscriber; the guard flushes the log file on drop
fn init_tracing(config: &system_config::SystemConfig, verbose: u8) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => config.log_level()?,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    match &config.log.file {
        Some(file) => {
            let (dir, name) = split_log_path(file)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn split_log_path(file: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let name = file
        .file_name()
        .with_context(|| format!("Log file {} has no file name", file.display()))?;
    let dir = match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, name))
}
