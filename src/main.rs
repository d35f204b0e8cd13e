//! CinCout server.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────┐
//!                      │          SUPERVISOR          │
//!                      │  launch N · replace on exit  │
//!                      └──────┬─────────┬─────────┬───┘
//!                             │ spawn   │         │
//!                             ▼         ▼         ▼
//!     Client ──────▶  ┌────────────┐ ┌────────────┐ ┌────────────┐
//!     (shared port)   │  worker 1  │ │  worker 2  │ │  worker N  │
//!                     └─────┬──────┘ └────────────┘ └────────────┘
//!                           │
//!                           ▼
//!          boundary → cors → compression → body → security headers
//!            → rate limit → static assets → /api/* collaborators → 404
//! ```
//!
//! Each worker is this same executable run with the `worker` subcommand.
//! Workers run a single-threaded runtime; parallelism comes from the pool.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::Instrument;

use cincout_server::config::{resolve_config, CincoutConfig};
use cincout_server::http::{Worker, WorkerOutcome};
use cincout_server::lifecycle::{signals, ProcessLauncher, Shutdown, Supervisor};
use cincout_server::observability::{self, role_span, Role};

#[derive(Parser)]
#[command(name = "cincout-server", version)]
#[command(about = "Supervised HTTP front end for the CinCout code tooling service", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the supervisor and its worker pool (default)
    Serve {
        /// Number of workers (defaults to the available parallelism)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Run a single worker; launched by the supervisor
    #[command(hide = true)]
    Worker,
    /// Validate the configuration and print it fully resolved
    CheckConfig,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = resolve_config(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve { workers: None }) {
        Command::CheckConfig => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Serve { workers } => {
            if workers.is_some() {
                config.supervisor.workers = workers;
            }
            observability::init(&config.observability);
            run_supervisor(config, cli.config.as_deref())
        }
        Command::Worker => {
            observability::init(&config.observability);
            run_worker(config)
        }
    }
}

fn runtime() -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread().enable_all().build()
}

fn run_supervisor(config: CincoutConfig, config_path: Option<&Path>) -> anyhow::Result<()> {
    let launcher = ProcessLauncher::current_exe(config_path).context("Failed to locate executable")?;
    let supervisor = Supervisor::new(&config.supervisor, launcher);

    tracing::info!(
        bind_address = %config.server.bind_address(),
        workers = supervisor.pool_size(),
        "cincout-server v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    runtime()?.block_on(
        async move {
            let shutdown = Shutdown::new();
            let stopped = shutdown.subscribe();
            tokio::spawn(async move { signals::forward_to(&shutdown).await });

            supervisor.run(stopped).await?;
            anyhow::Ok(())
        }
        .instrument(role_span(Role::Supervisor)),
    )
}

fn run_worker(config: CincoutConfig) -> anyhow::Result<()> {
    let outcome = runtime()?.block_on(
        async move {
            let worker = Worker::new(config);
            let listener = worker.bind()?;

            let shutdown = Shutdown::new();
            let stopped = shutdown.subscribe();
            tokio::spawn(async move { signals::forward_to(&shutdown).await });

            anyhow::Ok(worker.run(listener, stopped).await?)
        }
        .instrument(role_span(Role::Worker)),
    )?;

    if let WorkerOutcome::MemoryExceeded(breach) = outcome {
        tracing::error!(pid = breach.pid, "Exiting for restart");
        std::process::exit(1);
    }
    Ok(())
}
