//! # RWO - RisingWave operator
//!
//! Entry point for the operator binary.
//!
//! ## Initialization Sequence
//!
//! 1. **Configuration** - Load the TOML configuration, or use the defaults
//! 2. **Tracing** - `RUST_LOG` wins over the configured filter
//! 3. **Object Store** - Load RisingWave manifests into the in-memory store
//! 4. **Controller** - Wire the store, component manager and event recorder
//! 5. **Reconciliation Loop** - Fed by a resync tick and the store's change feed
//!
//! ## Shutdown
//!
//! Ctrl+C stops the loop; in-flight reconciles finish before the process exits.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rwo_reconciler::{
    ControllerConfig, InMemoryComponentManager, InMemoryObjectStore, OperatorConfig,
    ReconcileWorkflow, ReconciliationLoop, RisingWave, RisingWaveController, TracingEventRecorder,
    TracingHook,
};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_tracing(&config.log.filter);

    match cli.command {
        Commands::Run { manifest } => run(&config, &manifest).await,
        Commands::DryRun { manifest } => {
            let workflow = build_workflow(&config, &manifest)?;
            println!("{}", workflow.dry_run());
            Ok(())
        }
        Commands::Describe { manifest } => {
            let workflow = build_workflow(&config, &manifest)?;
            println!("{}", workflow.describe());
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_filter))
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&Path>) -> Result<OperatorConfig> {
    path.map_or_else(
        || Ok(OperatorConfig::default()),
        |path| {
            OperatorConfig::load(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))
        },
    )
}

fn load_manifest(path: &Path) -> Result<RisingWave> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    RisingWave::from_yaml(&source)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

fn controller(
    config: ControllerConfig,
    store: Arc<InMemoryObjectStore>,
) -> RisingWaveController {
    RisingWaveController::new(
        store,
        Arc::new(InMemoryComponentManager::new()),
        Arc::new(TracingEventRecorder),
        config,
    )
    .with_action_hook(Arc::new(TracingHook))
}

fn build_workflow(config: &OperatorConfig, manifest: &Path) -> Result<ReconcileWorkflow> {
    let risingwave = load_manifest(manifest)?;
    controller(
        config.controller_config(),
        Arc::new(InMemoryObjectStore::new()),
    )
    .build_workflow(risingwave)
    .context("Failed to build workflow")
}

/// Reconcile the given manifests until Ctrl+C.
async fn run(config: &OperatorConfig, manifests: &[PathBuf]) -> Result<()> {
    let objects = manifests
        .iter()
        .map(|path| load_manifest(path))
        .collect::<Result<Vec<_>>>()?;
    info!(objects = objects.len(), "RWO starting...");

    let store = Arc::new(InMemoryObjectStore::with_objects(objects));
    let controller = Arc::new(controller(config.controller_config(), store.clone()));

    let mut reconciliation = ReconciliationLoop::new(controller, store.clone(), config.loop_config());
    let stopper = reconciliation.stopper();
    let feed = reconciliation.enqueuer().watch(store.subscribe());
    let handle = tokio::spawn(async move { reconciliation.run().await });

    info!("RWO is running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    stopper.stop();
    let outcome = handle.await.context("Reconciliation loop task failed")?;
    feed.abort();
    outcome.context("Reconciliation loop failed")?;

    info!("RWO stopped gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
