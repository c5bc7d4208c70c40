//! Relay Gateway - Main entry point.

use anyhow::Result;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; variables may come from the real environment
    let dotenv = dotenvy::dotenv();

    let config = Config::load_with_env()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    if let Ok(path) = dotenv {
        tracing::debug!("Loaded environment from {}", path.display());
    }
    tracing::info!("Relay Gateway v{}", env!("CARGO_PKG_VERSION"));

    relay_gateway::start_server(&config).await
}
