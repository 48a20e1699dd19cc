//! # cfp-controller
//!
//! Entry point for the CFP controller.
//!
//! ## Startup
//!
//! 1. **Configuration** - defaults, config file, environment, then flags
//! 2. **Registry client** - HTTP client for the CFP API
//! 3. **Manager** - Speaker and Proposal controllers over the resource store
//!
//! ## Shutdown
//!
//! Ctrl+C stops the manager; workers finish their current pass and exit.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cfp_controller::{Cli, OperatorConfig};
use cfp_core::{Proposal, Speaker};
use cfp_reconciler::Manager;
use cfp_registry::RegistryClient;
use cfp_store::InMemoryStore;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = OperatorConfig::load(&cli).context("Invalid configuration")?;

    info!(
        endpoint = %config.registry.endpoint,
        workers = config.controller.workers,
        "CFP controller starting"
    );

    let registry = RegistryClient::with_config(config.registry.clone())
        .context("Failed to build registry client")?;

    let manager = Manager::new(
        InMemoryStore::<Speaker>::new_arc(),
        InMemoryStore::<Proposal>::new_arc(),
        Arc::new(registry),
        config.controller.clone(),
    );

    let stopper = manager.stopper();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        stopper.stop();
    });

    info!("CFP controller is running. Press Ctrl+C to stop.");
    manager.run().await.context("Manager failed")?;

    info!("CFP controller stopped gracefully");
    Ok(())
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
