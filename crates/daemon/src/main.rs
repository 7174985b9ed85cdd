// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gantryd: the gantry orchestrator daemon.
//!
//! `gantryd <config>` runs the orchestrator root; the supervisor
//! re-invokes the same binary as `gantryd <config> --worker <name>` for
//! each worker process.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use gantry_core::AppConfig;
use gantry_daemon::{workers, Orchestrator, WorkerKind};
use gantry_storage::{StateStore, StoreLogLayer};

#[derive(Parser)]
#[command(name = "gantryd", version, about = "Medical-physics QA workflow orchestrator")]
struct Cli {
    /// Path to the YAML configuration file.
    config: PathBuf,

    /// Run a single worker instead of the orchestrator root.
    #[arg(long, value_enum)]
    worker: Option<WorkerKind>,
}

fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt::layer().with_target(true);

    if config.logging.to_store {
        // The sink gets its own handle so log writes never contend with
        // a workflow transaction on the same connection.
        let store = StateStore::open(&config.database.path)?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt)
            .with(StoreLogLayer::new(store))
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(fmt).init();
    }
    Ok(())
}

/// Cancel the token when SIGTERM or SIGINT arrives.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGINT handler");
                return;
            }
        };
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
        cancel.cancel();
    });
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = AppConfig::load(&cli.config)?;
    init_logging(&config)?;

    match cli.worker {
        Some(kind) => {
            let cancel = CancellationToken::new();
            spawn_signal_listener(cancel.clone());
            workers::run(kind, &config, &cancel).await?;
            Ok(())
        }
        None => {
            let orchestrator = Orchestrator::new(config, &cli.config)?;
            orchestrator.run().await?;
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Logging may not be initialized when config loading fails.
            eprintln!("gantryd: {err:#}");
            tracing::error!(error = %err, "fatal error");
            ExitCode::FAILURE
        }
    }
}
