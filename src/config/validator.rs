//! Property validation run before any connection attempt.

use crate::config::{DataSourcesConfig, DatabaseProperties};
use crate::error::ConfigError;
use crate::tenant::TenantId;

/// Required fields must be non-empty and `maxPoolSize` positive. All offending fields are reported at once.
pub fn validate_properties(tenant: &TenantId, props: &DatabaseProperties) -> Result<(), ConfigError> {
    let mut fields = Vec::new();
    if props.url.trim().is_empty() {
        fields.push("url");
    }
    if props.user_name.is_empty() {
        fields.push("userName");
    }
    if props.password.is_empty() {
        fields.push("password");
    }
    if props.driver.trim().is_empty() {
        fields.push("driver");
    }
    if props.max_pool_size == 0 {
        fields.push("maxPoolSize");
    }
    if fields.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::InvalidProperties {
            tenant: tenant.to_string(),
            fields,
        })
    }
}

/// Mode-level checks: single-tenant mode needs default properties; tenant maps never carry the reserved id in multi-tenant mode.
pub fn validate_config(config: &DataSourcesConfig) -> Result<(), ConfigError> {
    if !config.multitenancy_enabled && config.default.is_none() {
        return Err(ConfigError::Validation(
            "multitenancy is disabled but no default datasource properties are configured".into(),
        ));
    }
    if config.multitenancy_enabled && config.tenants.keys().any(TenantId::is_default) {
        return Err(ConfigError::Validation(format!(
            "tenant id '{}' is reserved for single-tenant mode",
            crate::tenant::DEFAULT_TENANT_ID
        )));
    }
    if config.refresh_check_interval_ms == 0 {
        return Err(ConfigError::Validation("refreshCheckIntervalMs must be positive".into()));
    }
    Ok(())
}
