//! Load datasource config from a JSON file and apply environment overrides.

use crate::config::{validate_config, DataSourcesConfig};
use crate::error::ConfigError;
use std::path::Path;

/// Env var that overrides `multitenancyEnabled`.
pub const MULTITENANCY_ENABLED_ENV: &str = "MULTITENANCY_ENABLED";
/// Env var that overrides `refreshCheckIntervalMs`.
pub const REFRESH_CHECK_INTERVAL_ENV: &str = "CREDENTIALS_REFRESH_CHECK_INTERVAL_MS";

/// Parse config JSON. Does not validate.
pub fn parse_config(json: &str) -> Result<DataSourcesConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(format!("invalid datasource config: {}", e)))
}

/// Read `path`, apply env overrides, then validate.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<DataSourcesConfig, ConfigError> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    let mut config = parse_config(&raw)?;
    apply_env_overrides(&mut config)?;
    validate_config(&config)?;
    tracing::info!(
        multitenancy_enabled = config.multitenancy_enabled,
        tenants = config.tenants.len(),
        "loaded datasource config from {}",
        path.display()
    );
    Ok(config)
}

pub fn apply_env_overrides(config: &mut DataSourcesConfig) -> Result<(), ConfigError> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

fn apply_overrides(
    config: &mut DataSourcesConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(v) = lookup(MULTITENANCY_ENABLED_ENV) {
        config.multitenancy_enabled = v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{}: expected true or false, got '{}'", MULTITENANCY_ENABLED_ENV, v)))?;
    }
    if let Some(v) = lookup(REFRESH_CHECK_INTERVAL_ENV) {
        config.refresh_check_interval_ms = v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation(format!("{}: expected milliseconds, got '{}'", REFRESH_CHECK_INTERVAL_ENV, v)))?;
    }
    Ok(())
}
