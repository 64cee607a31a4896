//! Intent Gateway - Main entry point.

use anyhow::Result;
use intent_common::config::Config;
use intent_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(&config.observability.log_level, &config.observability.log_format);

    tracing::info!("Intent Gateway v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    if !config.has_api_key() {
        tracing::warn!("No provider API key configured; set OPENROUTER_API_KEY");
    }

    intent_gateway::start_server(&config).await
}
