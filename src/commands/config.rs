use anyhow::Result;
use colored::Colorize;
use obligato_server::config::{self, Config};
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the effective configuration with secrets masked
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(config_path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());
    info!("Validating configuration");

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen: {}:{}", cfg.server.host, cfg.server.port);
    println!("  Environment: {}", cfg.server.environment.as_str());
    println!("  Threat analysis: {}", enabled_label(cfg.gemini.api_key.is_some()));
    println!("  Email: {}", enabled_label(email_enabled(&cfg)));

    info!("Configuration validation successful");
    Ok(())
}

fn enabled_label(enabled: bool) -> colored::ColoredString {
    if enabled {
        "enabled".green()
    } else {
        "disabled".red()
    }
}

fn email_enabled(cfg: &Config) -> bool {
    cfg.email.access_key_id.is_some() && cfg.email.secret_access_key.is_some()
}

/// Sanitize secrets in configuration for safe display
fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();

    sanitized.gemini.api_key = sanitized.gemini.api_key.as_deref().map(mask_api_key);
    sanitized.email.access_key_id = sanitized.email.access_key_id.as_deref().map(mask_api_key);
    sanitized.email.secret_access_key = sanitized
        .email
        .secret_access_key
        .as_deref()
        .map(mask_api_key);

    sanitized
}

/// Mask an API key for safe display
///
/// Shows first 7 and last 4 characters with dots in between
/// Example: "AIzaSyA1234567890abcd" -> "AIzaSyA...abcd"
fn mask_api_key(key: &str) -> String {
    if key.len() <= 11 || !key.is_ascii() {
        // Too short to mask meaningfully
        return "***".to_string();
    }

    let prefix = &key[..7];
    let suffix = &key[key.len() - 4..];

    format!("{}...{}", prefix, suffix)
}
