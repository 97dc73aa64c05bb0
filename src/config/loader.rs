//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::schema::ShieldConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value {value:?} for environment variable {var}")]
    Env { var: &'static str, value: String },

    #[error("Invalid header value {value:?} in {field}")]
    InvalidHeader { field: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: optional TOML file, then environment overrides, then
/// validation.
pub fn load_config(path: Option<&Path>) -> Result<ShieldConfig, ConfigError> {
    load_config_with(path, |var| std::env::var(var).ok())
}

/// [`load_config`] with variables resolved through `lookup` instead of the
/// process environment.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<ShieldConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ShieldConfig::default(),
    };

    apply_env_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply the supported environment variables through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ShieldConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parse_var(&lookup, "RATE_LIMIT_WINDOW")? {
        config.rate_limit.window_secs = v;
    }
    if let Some(v) = parse_var(&lookup, "RATE_LIMIT_MAX_REQUESTS")? {
        config.rate_limit.max_requests = v;
    }
    if let Some(v) = parse_var(&lookup, "RATE_LIMIT_CHAT_MAX")? {
        config.rate_limit.chat_max_requests = v;
    }
    if let Some(origins) = lookup("ALLOWED_ORIGINS") {
        config.cors.allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(secret) = lookup("API_SECRET_KEY") {
        config.signature.secret = secret;
    }
    if let Some(addr) = lookup("SHIELD_BIND_ADDRESS") {
        config.listener.bind_address = addr;
    }
    Ok(())
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
        None => Ok(None),
    }
}
