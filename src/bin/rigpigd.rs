//! rigpig daemon - supervises the agent, API and console services
//!
//! This binary keeps the shared algo-stats and currency-rate state fresh
//! and runs the configured services until a termination signal arrives.
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! rigpigd start
//!
//! # Start the daemon (background/daemonized)
//! rigpigd start -d
//!
//! # Start with an explicit config file
//! rigpigd start --config /etc/rigpig/rigpigd.toml
//!
//! # Stop the daemon
//! rigpigd stop
//!
//! # Check daemon status
//! rigpigd status
//!
//! # Print the effective configuration
//! RIGPIG_ENABLE_WEB_CONSOLE=1 rigpigd config
//!
//! # Enable debug logging
//! RUST_LOG=rigpigd=debug rigpigd start
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT/SIGQUIT: graceful shutdown, waits for every service

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rigpig_core::{AlgoStat, CurrencyRate};
use rigpigd::config::ProducerConfig;
use rigpigd::services::build_service;
use rigpigd::sources::{JsonFileSource, StaticSource};
use rigpigd::{DaemonConfig, ProducerIntervals, ServiceKind, SnapshotSource, Supervisor};

/// rigpig daemon - mining rig service supervisor
#[derive(Parser, Debug)]
#[command(name = "rigpigd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,

        /// Path to the config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
    /// Print the effective configuration
    Config {
        /// Path to the config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Directory for the PID and log files (`<state_dir>/rigpig`).
fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("rigpig")
}

/// Returns the path to the PID file.
fn pid_file_path() -> PathBuf {
    state_dir().join("rigpigd.pid")
}

/// Returns the path the daemonized process logs to.
fn log_file_path() -> PathBuf {
    state_dir().join("rigpigd.log")
}

/// Reads the recorded daemon PID, if the PID file exists and parses.
fn read_pid() -> Option<u32> {
    let mut file = File::open(pid_file_path()).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    contents.trim().parse().ok()
}

/// Records this process as the running daemon.
fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

/// Removes the PID file, ignoring a file that is already gone.
fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// Checks for a live process with the given PID (Linux `/proc`).
fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Returns the daemon PID, clearing a stale PID file.
fn running_daemon() -> Option<u32> {
    let pid = read_pid()?;
    if is_process_running(pid) {
        return Some(pid);
    }
    remove_pid_file();
    None
}

/// Sends SIGTERM to the daemon, which starts its graceful shutdown.
fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            bail!("Invalid PID {pid}");
        };
        // SAFETY: kill(2) has no memory-safety preconditions
        let result = unsafe { libc::kill(raw, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Start {
        daemon: false,
        config: None,
    });

    match command {
        Command::Start { daemon, config } => {
            if let Some(pid) = running_daemon() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'rigpigd stop' to stop it first.");
                process::exit(1);
            }

            // Fail fast on a bad config, before forking
            let config = DaemonConfig::load(config.as_deref()).context("Failed to load configuration")?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;
            let result = run_daemon(config);
            remove_pid_file();

            result
        }
        Command::Stop => {
            let Some(pid) = running_daemon() else {
                println!("Daemon is not running.");
                return Ok(());
            };

            println!("Stopping daemon (PID {pid})...");
            stop_daemon(pid)?;

            for _ in 0..50 {
                if !is_process_running(pid) {
                    println!("Daemon stopped.");
                    return Ok(());
                }
                std::thread::sleep(std::time::Duration::from_millis(100));
            }

            eprintln!("Daemon did not stop within 5 seconds.");
            process::exit(1);
        }
        Command::Status => {
            let Some(pid) = running_daemon() else {
                println!("Daemon is not running.");
                process::exit(1);
            };
            println!("Daemon is running (PID {pid})");
            println!("PID file: {}", pid_file_path().display());
            Ok(())
        }
        Command::Config { config } => {
            let config = DaemonConfig::load(config.as_deref()).context("Failed to load configuration")?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// Forks into the background with stdout and stderr sent to the log file.
///
/// Must run before the tokio runtime is built.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout.try_clone().context("Failed to open log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Algo stats come from the configured JSON file, or start out empty.
fn algo_source(producers: &ProducerConfig) -> Arc<dyn SnapshotSource<AlgoStat>> {
    match &producers.algo_stats_path {
        Some(path) => Arc::new(JsonFileSource::<AlgoStat>::new(path.clone())),
        None => Arc::new(StaticSource::<AlgoStat>::new(Vec::new())),
    }
}

/// Currency rates come from the configured JSON file, or a fixed `[USD 1.0]`.
fn currency_source(producers: &ProducerConfig) -> Arc<dyn SnapshotSource<CurrencyRate>> {
    match &producers.currency_rates_path {
        Some(path) => Arc::new(JsonFileSource::<CurrencyRate>::new(path.clone())),
        None => Arc::new(StaticSource::new(vec![CurrencyRate::new("USD", 1.0)])),
    }
}

/// Runs the supervisor until a termination signal arrives.
#[tokio::main]
async fn run_daemon(config: DaemonConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rigpigd=info".parse()?)
                .add_directive("rigpig_core=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "rigpig daemon starting"
    );

    let intervals = ProducerIntervals {
        algo_stats: config.producers.algo_stats_interval(),
        currency_rates: config.producers.currency_rates_interval(),
    };

    let mut supervisor = Supervisor::new(
        config.services,
        algo_source(&config.producers),
        currency_source(&config.producers),
    )
    .with_intervals(intervals);

    for kind in ServiceKind::ALL {
        let service = build_service(kind, &config, supervisor.state());
        supervisor = supervisor.with_service(kind, service);
    }

    let summary = supervisor.start().await.context("Supervisor failed")?;

    info!(
        units = summary.units_completed,
        algo_updates = summary.algo_updates,
        currency_updates = summary.currency_updates,
        "rigpig daemon stopped"
    );
    Ok(())
}
