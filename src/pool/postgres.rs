//! PostgreSQL pools backed by `sqlx::PgPool`.

use super::health::{HealthCheck, HealthCheckRegistry, HealthStatus, LatencyP99Check, LatencyRecorder, CONNECTIVITY_CHECK, LATENCY_P99_CHECK};
use super::metrics::{MetricRegistry, ACTIVE_CONNECTIONS, IDLE_CONNECTIONS, PENDING_CONNECTIONS, TOTAL_CONNECTIONS};
use super::{PoolFactory, PoolStats, TenantPool};
use crate::config::DatabaseProperties;
use crate::error::{ConfigError, DataSourceError};
use crate::tenant::TenantId;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::{Connection, Postgres};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Instant of the most recent credential update. Connections opened before it are stale.
#[derive(Default)]
struct CredentialRotation {
    rotated_at: Mutex<Option<Instant>>,
}

impl CredentialRotation {
    fn mark(&self) {
        if let Ok(mut at) = self.rotated_at.lock() {
            *at = Some(Instant::now());
        }
    }

    /// True when a connection of this age was opened before the last rotation.
    fn predates(&self, age: Duration) -> bool {
        match self.rotated_at.lock() {
            Ok(at) => at.map(|t| t.elapsed() < age).unwrap_or(false),
            Err(_) => false,
        }
    }
}

pub struct PgTenantPool {
    id: Uuid,
    name: String,
    pool: PgPool,
    pending: Arc<AtomicUsize>,
    latency: Arc<LatencyRecorder>,
    rotation: Arc<CredentialRotation>,
    health: Arc<HealthCheckRegistry>,
    metrics: Arc<MetricRegistry>,
    check_timeout: Duration,
    expected_p99: Duration,
    close_timeout: Duration,
}

impl PgTenantPool {
    /// The underlying sqlx pool, for callers that want to run queries directly.
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }

    fn register_instrumentation(&self, tenant: &TenantId) {
        let prefix = instrumentation_prefix(tenant, &self.name);
        self.health.register(
            format!("{}.{}", prefix, CONNECTIVITY_CHECK),
            self.id,
            Arc::new(ConnectivityCheck {
                pool: self.pool.clone(),
                timeout: self.check_timeout,
            }),
        );
        self.health.register(
            format!("{}.{}", prefix, LATENCY_P99_CHECK),
            self.id,
            Arc::new(LatencyP99Check::new(Arc::clone(&self.latency), self.expected_p99)),
        );

        let pool = self.pool.clone();
        self.metrics
            .register_gauge(format!("{}.{}", prefix, TOTAL_CONNECTIONS), self.id, Arc::new(move || pool.size() as f64));
        let pool = self.pool.clone();
        self.metrics.register_gauge(
            format!("{}.{}", prefix, ACTIVE_CONNECTIONS),
            self.id,
            Arc::new(move || pool.size().saturating_sub(pool.num_idle() as u32) as f64),
        );
        let pool = self.pool.clone();
        self.metrics
            .register_gauge(format!("{}.{}", prefix, IDLE_CONNECTIONS), self.id, Arc::new(move || pool.num_idle() as f64));
        let pending = Arc::clone(&self.pending);
        self.metrics.register_gauge(
            format!("{}.{}", prefix, PENDING_CONNECTIONS),
            self.id,
            Arc::new(move || pending.load(Ordering::SeqCst) as f64),
        );
    }
}

#[async_trait]
impl TenantPool for PgTenantPool {
    type Connection = PoolConnection<Postgres>;

    fn name(&self) -> &str {
        &self.name
    }

    fn attach_instrumentation(&self, tenant: &TenantId) {
        self.register_instrumentation(tenant);
        tracing::debug!(tenant_id = %tenant, pool = %self.name, "health checks and gauges attached");
    }

    async fn acquire(&self) -> Result<Self::Connection, DataSourceError> {
        let started = Instant::now();
        self.pending.fetch_add(1, Ordering::SeqCst);
        let result = self.pool.acquire().await;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        let conn = result?;
        self.latency.record(started.elapsed());
        Ok(conn)
    }

    async fn check_connection(&self) -> Result<(), DataSourceError> {
        let mut conn = self.acquire().await?;
        conn.ping().await?;
        Ok(())
    }

    fn stats(&self) -> PoolStats {
        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        let stats = PoolStats {
            total,
            active: total.saturating_sub(idle),
            idle,
            pending: self.pending.load(Ordering::SeqCst) as u32,
        };
        tracing::debug!(pool = %self.name, ?stats, "pool counters");
        stats
    }

    fn update_credentials(&self, user_name: &str, password: &str) {
        let options = (*self.pool.connect_options())
            .clone()
            .username(user_name)
            .password(password);
        self.pool.set_connect_options(options);
        self.rotation.mark();
        tracing::info!(pool = %self.name, "credentials updated for new connections");
    }

    async fn drain(&self) {
        let idle = self.pool.num_idle();
        let mut evicted = 0usize;
        for _ in 0..idle {
            let Some(conn) = self.pool.try_acquire() else {
                break;
            };
            if let Err(e) = conn.close().await {
                tracing::warn!(pool = %self.name, "error closing evicted connection: {}", e);
            }
            evicted += 1;
        }
        tracing::info!(pool = %self.name, evicted, "soft-evicted idle connections");
    }

    async fn close(&self) {
        self.health.unregister_owned(self.id);
        self.metrics.unregister_owned(self.id);
        if self.pool.is_closed() {
            return;
        }
        if tokio::time::timeout(self.close_timeout, self.pool.close()).await.is_err() {
            tracing::warn!(pool = %self.name, "pool close timed out; remaining connections close on release");
        } else {
            tracing::info!(pool = %self.name, "pool closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

struct ConnectivityCheck {
    pool: PgPool,
    timeout: Duration,
}

#[async_trait]
impl HealthCheck for ConnectivityCheck {
    async fn check(&self) -> HealthStatus {
        let ping = async {
            let mut conn = self.pool.acquire().await?;
            conn.ping().await
        };
        match tokio::time::timeout(self.timeout, ping).await {
            Ok(Ok(())) => HealthStatus::healthy(),
            Ok(Err(e)) => HealthStatus::unhealthy(e.to_string()),
            Err(_) => HealthStatus::unhealthy(format!("no connection within {}ms", self.timeout.as_millis())),
        }
    }
}

/// `{tenant}.{poolName}`: pool names repeat across tenants, tenant ids do not.
pub fn instrumentation_prefix(tenant: &TenantId, pool_name: &str) -> String {
    format!("{}.{}", tenant, pool_name)
}

/// Builds [`PgTenantPool`]s. Their health checks and gauges go to the shared registries once
/// the registry makes them routable.
pub struct PgPoolFactory {
    health: Arc<HealthCheckRegistry>,
    metrics: Arc<MetricRegistry>,
    close_timeout: Duration,
}

impl PgPoolFactory {
    pub fn new(health: Arc<HealthCheckRegistry>, metrics: Arc<MetricRegistry>) -> Self {
        PgPoolFactory {
            health,
            metrics,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }
}

/// Connect options for one tenant: URL plus credentials, naming, statement cache and TLS.
pub fn connect_options(tenant: &TenantId, props: &DatabaseProperties) -> Result<PgConnectOptions, DataSourceError> {
    let driver = props.driver.to_ascii_lowercase();
    if driver != "postgres" && driver != "postgresql" {
        return Err(ConfigError::Validation(format!(
            "tenant '{}': unsupported driver '{}', expected postgres",
            tenant, props.driver
        ))
        .into());
    }
    let mut options = PgConnectOptions::from_str(&props.url)
        .map_err(|e| ConfigError::Validation(format!("tenant '{}': invalid url: {}", tenant, e)))?
        .username(&props.user_name)
        .password(&props.password)
        .application_name(&props.pool_name)
        .statement_cache_capacity(props.statement_cache_capacity());
    if props.cache_prepared_statements {
        tracing::debug!(
            tenant_id = %tenant,
            sql_limit = props.prepared_statement_cache_sql_limit,
            "statement cache sql limit is not enforced by the postgres driver"
        );
    }
    if props.one_way_tls() {
        let mode = PgSslMode::from_str(&props.ssl_mode)
            .map_err(|e| ConfigError::Validation(format!("tenant '{}': invalid sslMode: {}", tenant, e)))?;
        options = options.ssl_mode(mode);
        if !props.root_cert_path.trim().is_empty() {
            options = options.ssl_root_cert(props.root_cert_path.trim());
        }
    }
    Ok(options)
}

#[async_trait]
impl PoolFactory for PgPoolFactory {
    type Pool = PgTenantPool;

    async fn create(&self, tenant: &TenantId, props: &DatabaseProperties) -> Result<Self::Pool, DataSourceError> {
        let options = connect_options(tenant, props)?;
        let rotation = Arc::new(CredentialRotation::default());
        let hook_rotation = Arc::clone(&rotation);

        let builder = PgPoolOptions::new()
            .min_connections(props.min_pool_size)
            .max_connections(props.max_pool_size)
            .acquire_timeout(props.connection_timeout())
            .idle_timeout(props.idle_timeout())
            .test_before_acquire(true)
            .after_release(move |_conn, meta| {
                let keep = !hook_rotation.predates(meta.age);
                Box::pin(async move { Ok(keep) })
            });

        let pool = if props.one_way_tls() {
            tokio::time::timeout(props.ssl_response_timeout(), builder.connect_with(options))
                .await
                .map_err(|_| {
                    DataSourceError::Pool(format!(
                        "tls handshake for tenant '{}' exceeded {}ms",
                        tenant,
                        props.ssl_response_timeout().as_millis()
                    ))
                })??
        } else {
            builder.connect_with(options).await?
        };

        let tenant_pool = PgTenantPool {
            id: Uuid::new_v4(),
            name: props.pool_name.clone(),
            pool,
            pending: Arc::new(AtomicUsize::new(0)),
            latency: Arc::new(LatencyRecorder::default()),
            rotation,
            health: Arc::clone(&self.health),
            metrics: Arc::clone(&self.metrics),
            check_timeout: props.connection_timeout(),
            expected_p99: props.expected_p99_latency(),
            close_timeout: self.close_timeout,
        };
        tracing::info!(
            tenant_id = %tenant,
            pool = %tenant_pool.name,
            min = props.min_pool_size,
            max = props.max_pool_size,
            tls = props.one_way_tls(),
            "created pool"
        );
        Ok(tenant_pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::parse("t1").unwrap()
    }

    #[test]
    fn rejects_non_postgres_driver() {
        let mut props = DatabaseProperties::new("postgres://localhost/t1", "u", "p");
        props.driver = "org.h2.Driver".into();
        let err = connect_options(&tenant(), &props).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("org.h2.Driver"));
    }

    #[test]
    fn applies_credentials_and_pool_name() {
        let props = DatabaseProperties::new("postgres://localhost:5433/t1", "alice", "pw").with_pool_name("t1Pool");
        let options = connect_options(&tenant(), &props).unwrap();
        assert_eq!(options.get_username(), "alice");
        assert_eq!(options.get_port(), 5433);
        assert_eq!(options.get_database(), Some("t1"));
        assert_eq!(options.get_application_name(), Some("t1Pool"));
    }

    #[test]
    fn one_way_tls_parses_ssl_mode() {
        let mut props = DatabaseProperties::new("postgres://localhost/t1", "u", "p");
        props.auth_mechanism = "ONE-WAY-TLS".into();
        props.ssl_mode = "verify-full".into();
        let options = connect_options(&tenant(), &props).unwrap();
        assert!(matches!(options.get_ssl_mode(), PgSslMode::VerifyFull));

        props.ssl_mode = "sometimes".into();
        assert!(connect_options(&tenant(), &props).is_err());
    }

    #[test]
    fn instrumentation_is_scoped_by_tenant() {
        let t1 = instrumentation_prefix(&tenant(), "defaultPool");
        let t2 = instrumentation_prefix(&TenantId::parse("t2").unwrap(), "defaultPool");
        assert_eq!(t1, "t1.defaultPool");
        assert_ne!(t1, t2);
    }

    #[test]
    fn rotation_marks_older_connections_stale() {
        let rotation = CredentialRotation::default();
        assert!(!rotation.predates(Duration::from_secs(3600)));
        rotation.mark();
        std::thread::sleep(Duration::from_millis(5));
        assert!(rotation.predates(Duration::from_secs(3600)));
        assert!(!rotation.predates(Duration::from_micros(1)));
    }
}
