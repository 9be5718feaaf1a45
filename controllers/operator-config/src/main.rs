//! Operator Config Controller
//!
//! Watches the operator config file (image name and update graph) through a
//! file informer and keeps the parsed config loaded while it changes on disk.

mod config;
mod controller;
mod error;
mod reconciler;
mod watcher;

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::error::ControllerError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Operator Config Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Config file: {}", config.config_path.display());
    info!("  Resync period: {:?}", config.resync_period);
    info!("  Sync timeout: {:?}", config.sync_timeout);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            info!("Shutdown signal received");
            cancel.cancel();
        });
    }

    let controller = Controller::new(&config, cancel)?;
    controller.run().await?;

    info!("Operator Config Controller stopped");
    Ok(())
}
