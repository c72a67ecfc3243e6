//! Configuration file loader.
//!
//! Reads an optional TOML file into [`RelayConfig`]. Falls back to defaults
//! when the file is missing or malformed; command-line flags and environment
//! variables are layered on top by the binary.

use std::path::Path;

use parley_core::chat::reply::validate_fallback_phrases;
use parley_types::config::RelayConfig;
use parley_types::error::ConfigError;

/// Parse TOML text into a [`RelayConfig`]. Missing keys take their defaults.
pub fn parse_config(content: &str) -> Result<RelayConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Invalid(e.to_string()))
}

/// Reject settings the relay cannot run with.
pub fn validate_config(config: &RelayConfig) -> Result<(), ConfigError> {
    if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!(
            "endpoint must be an http(s) URL, got '{}'",
            config.endpoint
        )));
    }
    if config.model.trim().is_empty() {
        return Err(ConfigError::Invalid("model must not be empty".into()));
    }
    if config.history_window == 0 {
        return Err(ConfigError::Invalid("history_window must be at least 1".into()));
    }
    if config.max_tokens == 0 {
        return Err(ConfigError::Invalid("max_tokens must be at least 1".into()));
    }
    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Invalid("request_timeout_secs must be at least 1".into()));
    }
    if config.session_idle_secs == 0 {
        return Err(ConfigError::Invalid("session_idle_secs must be at least 1".into()));
    }
    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ConfigError::Invalid(format!(
            "temperature must be between 0 and 2, got {}",
            config.temperature
        )));
    }
    validate_fallback_phrases(&config.fallbacks)?;
    Ok(())
}

/// Load configuration from `path`, or defaults if `path` is None.
///
/// - Missing file: warns and returns [`RelayConfig::default()`].
/// - Unreadable or unparsable file: warns and returns the default.
pub async fn load_config(path: Option<&Path>) -> RelayConfig {
    let Some(path) = path else {
        tracing::debug!("No config file given, using defaults");
        return RelayConfig::default();
    };

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("Config file {} not found, using defaults", path.display());
            return RelayConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return RelayConfig::default();
        }
    };

    match parse_config(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            RelayConfig::default()
        }
    }
}
