//! Startup orchestration.
//!
//! Config → logging → guard → election → supervision. Any failure before the
//! election is fatal; after it, the outcome alone decides the exit code.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;
use tracing::Instrument;

use super::guard::TopLevelGuard;
use super::signals::{wait_for_shutdown_signal, SignalInstallError};
use crate::config::loader::{read_config, ConfigError};
use crate::config::validation::validate_config;
use crate::config::MonarchConfig;
use crate::election::{ElectionOutcome, Identity, LeaderElector, MasterLease};
use crate::observability::logging::{init_logging, LoggingError};
use crate::observability::metrics;
use crate::supervisor::{CommandSpawner, LoggingRelay, NixSignaller, ProcessSupervisor, WorkerSpec};

/// Command line of the `monarch` binary.
#[derive(Debug, Default, Parser)]
#[command(name = "monarch")]
#[command(about = "Run one supervised worker per machine", long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Rendezvous address, overrides election.bind_address
    #[arg(long)]
    pub bind: Option<String>,

    /// Log level or filter directives
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Worker program and its arguments
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl Cli {
    /// Overlay command-line values on a file configuration.
    pub fn apply(self, config: &mut MonarchConfig) {
        if let Some(bind) = self.bind {
            config.election.bind_address = bind;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(path) = self.log_file {
            config.observability.log_file = Some(path);
        }
        let mut command = self.command.into_iter();
        if let Some(program) = command.next() {
            config.worker.program = program;
            config.worker.args = command.collect();
        }
    }
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("signal handling: {0}")]
    Signals(#[from] SignalInstallError),

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("waiting for shutdown signal: {0}")]
    ShutdownSignal(#[source] std::io::Error),
}

/// Read the file (if any), apply overrides, validate the result.
pub fn resolve_config(cli: Cli) -> Result<MonarchConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => read_config(path)?,
        None => MonarchConfig::default(),
    };
    cli.apply(&mut config);
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Run one master candidate to completion.
pub async fn run(cli: Cli) -> Result<ExitCode, StartupError> {
    let config = resolve_config(cli)?;
    init_logging(
        &config.observability.log_level,
        config.observability.log_file.as_deref(),
    )?;

    let identity = Identity::current(config.app_name.clone());
    tracing::info!(process = %identity, "monarch v{} starting", env!("CARGO_PKG_VERSION"));

    let guard = TopLevelGuard::install(&config.guard)?;

    let elector = LeaderElector::new(&config.election, identity.clone());
    match elector.elect().await {
        ElectionOutcome::Master(lease) => {
            tracing::info!(
                process = %identity,
                address = %lease.local_addr(),
                "Elected master"
            );
            if let Some(addr) = &config.observability.metrics_address {
                // validated already
                if let Ok(addr) = addr.parse() {
                    metrics::init_metrics(addr)?;
                }
            }
            supervise(config, identity, lease, &guard).await?;
            tracing::info!("Shutdown complete");
            Ok(ExitCode::SUCCESS)
        }
        ElectionOutcome::FollowerNotified(master) => {
            tracing::info!(process = %identity, master = %master, "exiting: notified existing master");
            Ok(ExitCode::SUCCESS)
        }
        ElectionOutcome::CommunicationFailure(e) => {
            tracing::error!(process = %identity, error = %e, "Leader election failed");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Supervise the worker until a shutdown signal has been handled.
async fn supervise(
    config: MonarchConfig,
    identity: Identity,
    mut lease: MasterLease,
    guard: &TopLevelGuard,
) -> Result<(), StartupError> {
    let (supervisor, handle) = ProcessSupervisor::new(
        config.supervisor.clone(),
        WorkerSpec::from(&config.worker),
        CommandSpawner,
        Arc::new(NixSignaller),
        Arc::new(LoggingRelay::new()),
    );

    let span = tracing::info_span!("master", process = %identity);
    let mut task = tokio::spawn(supervisor.run().instrument(span));

    let shutdown = wait_for_shutdown_signal(guard.ignored());
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut task => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Supervisor task failed");
                }
                return Ok(());
            }
            Some(follower) = lease.next_follower() => {
                tracing::info!(follower = %follower, "Follower reported in");
                if config.election.restart_worker_on_notify {
                    let _ = handle.restart();
                }
            }
            signal = &mut shutdown => {
                let signal = signal.map_err(StartupError::ShutdownSignal)?;
                tracing::info!(signal = %signal, "Shutdown signal received, stopping worker");
                let _ = handle.shutdown();
                break;
            }
        }
    }

    if let Err(e) = task.await {
        tracing::error!(error = %e, "Supervisor task failed");
    }
    Ok(())
}
