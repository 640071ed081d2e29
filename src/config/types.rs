//! Datasource configuration types matching the JSON config file (camelCase keys, legacy aliases accepted).

use crate::tenant::TenantId;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Auth mechanism value that turns on one-way TLS to the server.
pub const ONE_WAY_TLS_AUTH_MECHANISM: &str = "one-way-tls";

/// Credentials provider used when a tenant does not name one.
pub const DEFAULT_CREDENTIALS_PROVIDER: &str = "default";

pub const DEFAULT_REFRESH_CHECK_INTERVAL_MS: u64 = 86_400_000;

fn default_driver() -> String {
    "postgres".into()
}
fn default_pool_name() -> String {
    "defaultPool".into()
}
fn default_connection_timeout_ms() -> u64 {
    60_000
}
fn default_min_pool_size() -> u32 {
    1
}
fn default_max_pool_size() -> u32 {
    10
}
fn default_max_idle_time_seconds() -> u64 {
    600
}
fn default_true() -> bool {
    true
}
fn default_statement_cache_size() -> u32 {
    250
}
fn default_statement_cache_sql_limit() -> u32 {
    2048
}
fn default_expected_p99_latency_ms() -> u64 {
    60_000
}
fn default_credentials_provider() -> Option<String> {
    Some(DEFAULT_CREDENTIALS_PROVIDER.into())
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    10
}
fn default_ssl_mode() -> String {
    "prefer".into()
}
fn default_ssl_response_timeout_ms() -> u64 {
    5_000
}
fn default_refresh_check_interval_ms() -> u64 {
    DEFAULT_REFRESH_CHECK_INTERVAL_MS
}

/// Accepts `true`, `"true"`, `"TRUE"`, `false`, `"false"`.
fn bool_or_string<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    match v {
        serde_json::Value::Bool(b) => Ok(b),
        serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected \"true\" or \"false\", got \"{}\"",
                other
            ))),
        },
        other => Err(serde::de::Error::custom(format!(
            "expected a bool or a bool-as-string; got {}",
            other
        ))),
    }
}

/// Connection settings for one tenant's pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProperties {
    #[serde(default, alias = "jdbcUrl")]
    pub url: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default = "default_driver", alias = "driverClassName")]
    pub driver: String,
    #[serde(default = "default_pool_name")]
    pub pool_name: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_min_pool_size")]
    pub min_pool_size: u32,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
    #[serde(default = "default_max_idle_time_seconds", alias = "maxIdleTime")]
    pub max_idle_time_seconds: u64,
    #[serde(
        default = "default_true",
        alias = "cachePrepStmts",
        deserialize_with = "bool_or_string"
    )]
    pub cache_prepared_statements: bool,
    #[serde(default = "default_statement_cache_size", alias = "prepStmtCacheSize")]
    pub prepared_statement_cache_size: u32,
    #[serde(default = "default_statement_cache_sql_limit", alias = "prepStmtCacheSqlLimit")]
    pub prepared_statement_cache_sql_limit: u32,
    #[serde(default = "default_expected_p99_latency_ms", alias = "expected99thPercentileMsValue")]
    pub expected_p99_latency_ms: u64,
    /// Name of the credentials provider (shared instance or factory). `None` uses the configured credentials as-is.
    #[serde(default = "default_credentials_provider", alias = "credentialProviderBeanName")]
    pub credentials_provider: Option<String>,
    #[serde(default, alias = "postgresCredRefreshEnabled")]
    pub credentials_refresh_enabled: bool,
    #[serde(default = "default_retry_count")]
    pub data_source_retry_count: u32,
    #[serde(default = "default_retry_delay_ms", alias = "dataSourceRetryDelay")]
    pub data_source_retry_delay_ms: u64,
    #[serde(default = "default_retry_count")]
    pub connection_retry_count: u32,
    #[serde(default = "default_retry_delay_ms", alias = "connectionRetryDelay")]
    pub connection_retry_delay_ms: u64,
    #[serde(default)]
    pub auth_mechanism: String,
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
    #[serde(default = "default_ssl_response_timeout_ms", alias = "sslResponseTimeout")]
    pub ssl_response_timeout_ms: u64,
    #[serde(default, alias = "rootCrtPath")]
    pub root_cert_path: String,
}

impl Default for DatabaseProperties {
    fn default() -> Self {
        DatabaseProperties {
            url: String::new(),
            user_name: String::new(),
            password: String::new(),
            driver: default_driver(),
            pool_name: default_pool_name(),
            connection_timeout_ms: default_connection_timeout_ms(),
            min_pool_size: default_min_pool_size(),
            max_pool_size: default_max_pool_size(),
            max_idle_time_seconds: default_max_idle_time_seconds(),
            cache_prepared_statements: true,
            prepared_statement_cache_size: default_statement_cache_size(),
            prepared_statement_cache_sql_limit: default_statement_cache_sql_limit(),
            expected_p99_latency_ms: default_expected_p99_latency_ms(),
            credentials_provider: default_credentials_provider(),
            credentials_refresh_enabled: false,
            data_source_retry_count: default_retry_count(),
            data_source_retry_delay_ms: default_retry_delay_ms(),
            connection_retry_count: default_retry_count(),
            connection_retry_delay_ms: default_retry_delay_ms(),
            auth_mechanism: String::new(),
            ssl_mode: default_ssl_mode(),
            ssl_response_timeout_ms: default_ssl_response_timeout_ms(),
            root_cert_path: String::new(),
        }
    }
}

impl DatabaseProperties {
    /// Properties for `url` with the given credentials and every other field defaulted.
    pub fn new(url: impl Into<String>, user_name: impl Into<String>, password: impl Into<String>) -> Self {
        DatabaseProperties {
            url: url.into(),
            user_name: user_name.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn with_pool_name(mut self, pool_name: impl Into<String>) -> Self {
        self.pool_name = pool_name.into();
        self
    }

    pub fn with_credentials_provider(mut self, name: Option<&str>) -> Self {
        self.credentials_provider = name.map(String::from);
        self
    }

    pub fn one_way_tls(&self) -> bool {
        self.auth_mechanism.eq_ignore_ascii_case(ONE_WAY_TLS_AUTH_MECHANISM)
    }

    /// Provider name, or `None` when unset or blank.
    pub fn credentials_provider_name(&self) -> Option<&str> {
        self.credentials_provider
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.max_idle_time_seconds)
    }

    pub fn ssl_response_timeout(&self) -> Duration {
        Duration::from_millis(self.ssl_response_timeout_ms)
    }

    pub fn expected_p99_latency(&self) -> Duration {
        Duration::from_millis(self.expected_p99_latency_ms)
    }

    /// Effective statement cache capacity; zero when caching is disabled.
    pub fn statement_cache_capacity(&self) -> usize {
        if self.cache_prepared_statements {
            self.prepared_statement_cache_size as usize
        } else {
            0
        }
    }
}

/// Process-wide datasource configuration: mode flag, refresh interval, and per-tenant properties.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourcesConfig {
    #[serde(default)]
    pub multitenancy_enabled: bool,
    #[serde(default = "default_refresh_check_interval_ms")]
    pub refresh_check_interval_ms: u64,
    /// Single-tenant properties, used only when multi-tenancy is disabled.
    #[serde(default)]
    pub default: Option<DatabaseProperties>,
    #[serde(default)]
    pub tenants: BTreeMap<TenantId, DatabaseProperties>,
}

impl Default for DataSourcesConfig {
    fn default() -> Self {
        DataSourcesConfig {
            multitenancy_enabled: false,
            refresh_check_interval_ms: DEFAULT_REFRESH_CHECK_INTERVAL_MS,
            default: None,
            tenants: BTreeMap::new(),
        }
    }
}

impl DataSourcesConfig {
    pub fn refresh_check_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_check_interval_ms)
    }
}
