//! LINE Relay - Main entry point.

use anyhow::Result;
use line_relay::start_server;
use relay_common::config::{config_path, Config};
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    let path = config_path();
    if !path.exists() {
        tracing::info!("Config file {} not found, using defaults", path.display());
    }

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return Err(e.into());
    }

    tracing::info!("LINE Relay v{}", env!("CARGO_PKG_VERSION"));

    // Start the HTTP server
    start_server(&config).await
}
