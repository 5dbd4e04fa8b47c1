use serde::{Deserialize, Serialize};
use std::path::Path;

/// Variable selecting production or development behaviour
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

pub const DEFAULT_FROM_ADDRESS: &str = "info@aerapass.com";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub email: EmailConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    /// Anything other than `production` is treated as development
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("production") {
            Self::Production
        } else {
            Self::Development
        }
    }

    /// Read the environment flag from the process environment
    pub fn detect() -> Self {
        std::env::var(ENVIRONMENT_VAR)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Development => "development",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeminiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub from: String,
    /// Overrides `https://email.{region}.amazonaws.com`
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
}

/// Flat variables mapped onto nested config keys
const WELL_KNOWN_VARS: [(&str, &str); 7] = [
    ("HOST", "server.host"),
    ("PORT", "server.port"),
    (ENVIRONMENT_VAR, "server.environment"),
    ("GEMINI_API_KEY", "gemini.api_key"),
    ("AWS_ACCESS_KEY_ID", "email.access_key_id"),
    ("AWS_SECRET_ACCESS_KEY", "email.secret_access_key"),
    ("AWS_SES_FROM", "email.from"),
];

/// Load configuration from `path` (optional) and the process environment
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    load_config_with(path, |name| std::env::var(name).ok())
}

/// Load configuration with an explicit variable lookup
///
/// Precedence, lowest first: built-in defaults, the TOML file, `OBLIGATO__*`
/// variables, then the well-known flat variables (`PORT`, `GEMINI_API_KEY`, ...).
pub fn load_config_with<F>(path: &Path, lookup: F) -> anyhow::Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 3000)?
        .set_default("server.environment", "development")?
        .set_default("gemini.base_url", "https://generativelanguage.googleapis.com/v1beta")?
        .set_default("gemini.model", "gemini-2.0-flash-001")?
        .set_default("gemini.timeout_seconds", 60)?
        .set_default("email.region", "us-east-1")?
        .set_default("email.from", DEFAULT_FROM_ADDRESS)?
        .set_default("email.timeout_seconds", 30)?
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("OBLIGATO").separator("__"));

    for (var, key) in WELL_KNOWN_VARS {
        let value = lookup(var).filter(|v| !v.is_empty());
        let value = if var == ENVIRONMENT_VAR {
            value.map(|v| Environment::parse(&v).as_str().to_string())
        } else {
            value
        };
        builder = builder.set_override_option(key, value)?;
    }

    let cfg: Config = builder.build()?.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        anyhow::bail!("server.port must be non-zero");
    }

    if cfg.gemini.timeout_seconds == 0 {
        anyhow::bail!("gemini.timeout_seconds must be greater than zero");
    }
    if let Err(e) = url::Url::parse(&cfg.gemini.base_url) {
        anyhow::bail!("gemini.base_url '{}' is invalid: {}", cfg.gemini.base_url, e);
    }

    if cfg.email.timeout_seconds == 0 {
        anyhow::bail!("email.timeout_seconds must be greater than zero");
    }
    match (&cfg.email.access_key_id, &cfg.email.secret_access_key) {
        (Some(_), None) => anyhow::bail!("AWS_ACCESS_KEY_ID is set but AWS_SECRET_ACCESS_KEY is missing"),
        (None, Some(_)) => anyhow::bail!("AWS_SECRET_ACCESS_KEY is set but AWS_ACCESS_KEY_ID is missing"),
        _ => {}
    }
    if let Some(endpoint) = &cfg.email.endpoint {
        if let Err(e) = url::Url::parse(endpoint) {
            anyhow::bail!("email.endpoint '{}' is invalid: {}", endpoint, e);
        }
    }

    Ok(())
}
