//! # Scribe Daemon
//!
//! Single entry point for the processing core: enforces single-instance via a
//! PID file, validates configuration, runs database migrations, and drives the
//! queue and event dispatcher until shutdown. Exits non-zero on fatal
//! configuration or database errors.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use scribe_core::config::ScribeConfig;
use scribe_core::context::ServiceContext;
use scribe_core::database;
use scribe_core::logging::init_structured_logging;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "scribed")]
#[command(about = "Scribe dictation processing daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the processing daemon (default)
    Run,

    /// Validate configuration and exit
    CheckConfig,

    /// Apply pending database migrations and exit
    Migrate,
}

/// Removes the PID file when the daemon exits.
struct PidFileGuard {
    path: PathBuf,
}

impl Drop for PidFileGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "Failed to remove PID file");
        }
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    // No cheap liveness probe available; assume the instance is running.
    true
}

/// Enforce single instance: refuse to start when a live process holds the
/// PID file, reclaim it when the recorded process is gone.
fn acquire_pid_file(path: &Path) -> anyhow::Result<PidFileGuard> {
    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading PID file {}", path.display()))?;

        if let Ok(existing_pid) = raw.trim().parse::<u32>() {
            if process_alive(existing_pid) {
                bail!(
                    "another instance is already running (pid {existing_pid}, {})",
                    path.display()
                );
            }
            warn!(
                stale_pid = existing_pid,
                path = %path.display(),
                "Reclaiming stale PID file"
            );
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    fs::write(path, process::id().to_string())
        .with_context(|| format!("writing PID file {}", path.display()))?;

    Ok(PidFileGuard {
        path: path.to_path_buf(),
    })
}

async fn run_daemon(config: ScribeConfig) -> anyhow::Result<()> {
    let _pid_guard = acquire_pid_file(&config.pid_file_path())?;

    let (context, mut dispatcher) = ServiceContext::initialize(config).await?;

    dispatcher.subscribe(|event| {
        info!(summary = %event.summary(), "Processing event");
    });
    let dispatcher_handle = tokio::spawn(dispatcher.run());

    info!("scribed running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutdown signal received");
    context.shutdown().await;
    drop(context);

    // Dropping the context closes the event channel; give the dispatcher a
    // moment to drain what is left.
    let _ = tokio::time::timeout(Duration::from_secs(5), dispatcher_handle).await;

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ScribeConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            config.validate().context("validating configuration")?;
            println!("Configuration OK");
            Ok(())
        }

        Commands::Migrate => {
            config.validate().context("validating configuration")?;
            let pool = database::connect(&config.database, &config.database_path()).await?;
            database::migrations::run_migrations(&pool).await?;
            pool.close().await;
            println!("Migrations applied");
            Ok(())
        }

        Commands::Run => run_daemon(config).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_structured_logging();

    if let Err(err) = run(cli).await {
        error!(error = %err, "Fatal error");
        eprintln!("scribed: {err:#}");
        process::exit(1);
    }
}
