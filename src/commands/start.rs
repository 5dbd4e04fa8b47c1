use anyhow::Result;
use colored::Colorize;
use obligato_server::{config, server};
use std::path::Path;
use tracing::info;

/// Execute the start command
///
/// Loads configuration and serves until a shutdown signal arrives.
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting Obligato Server...".green());

    let cfg = config::load_config(config_path)?;
    info!(
        config = %config_path.display(),
        environment = cfg.server.environment.as_str(),
        "Configuration loaded"
    );

    // Blocks until shutdown
    server::start_server(cfg).await?;

    Ok(())
}
