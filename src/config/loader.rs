//! Configuration loading from disk or the environment.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::config::schema::{AppServiceConfig, GatewayConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Passing this as the config path reads the environment instead of a file.
pub const ENV_SOURCE: &str = "env";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} environment variable is not set")]
    MissingEnv(&'static str),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from `source`, which is either a TOML file path or
/// [`ENV_SOURCE`].
pub fn load(source: &str) -> Result<GatewayConfig, ConfigError> {
    if source == ENV_SOURCE {
        load_from_env(|key| std::env::var(key).ok())
    } else {
        load_config(Path::new(source))
    }
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: GatewayConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!(
        path = %path.display(),
        appservices = config.appservices.len(),
        "Configuration loaded from file"
    );
    Ok(config)
}

/// Build a single-appservice configuration from environment variables.
///
/// `lookup` abstracts `std::env::var` so the mapping can be exercised
/// without touching the process environment.
pub fn load_from_env<F>(lookup: F) -> Result<GatewayConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let required = |key: &'static str| {
        lookup(key)
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingEnv(key))
    };
    let optional = |key: &str| lookup(key).unwrap_or_default();

    let mut config = GatewayConfig {
        listen_address: required("LISTEN_ADDRESS")?,
        ..Default::default()
    };
    config.appservices.push(AppServiceConfig {
        id: required("APPSERVICE_ID")?,
        outbound_token: required("AS_TOKEN")?,
        inbound_token: required("HS_TOKEN")?,
    });
    config.sync_proxy.url = optional("SYNC_PROXY_URL");
    config.sync_proxy.wsproxy_url = optional("SYNC_PROXY_WSPROXY_URL");
    config.sync_proxy.shared_secret = optional("SYNC_PROXY_SHARED_SECRET");

    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::info!("Found one appservice from environment variables");
    Ok(config)
}
