//! Pool capability surface and factory. The registry only ever talks to pools through these traits.

pub mod health;
pub mod metrics;
pub mod postgres;

pub use health::{HealthCheck, HealthCheckRegistry, HealthStatus, LatencyRecorder};
pub use metrics::MetricRegistry;
pub use postgres::{PgPoolFactory, PgTenantPool};

use crate::config::DatabaseProperties;
use crate::error::DataSourceError;
use crate::tenant::TenantId;
use async_trait::async_trait;
use serde::Serialize;

/// Point-in-time utilization counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
    pub pending: u32,
}

/// A live connection pool serving one tenant.
#[async_trait]
pub trait TenantPool: Send + Sync + 'static {
    type Connection: Send + 'static;

    fn name(&self) -> &str;

    /// Publish this pool's health checks and gauges under `{tenant}.{poolName}`. Called once the
    /// pool is routable; a pool that never becomes routable never publishes anything.
    fn attach_instrumentation(&self, tenant: &TenantId);

    async fn acquire(&self) -> Result<Self::Connection, DataSourceError>;

    /// Acquire a connection and verify it is alive.
    async fn check_connection(&self) -> Result<(), DataSourceError>;

    fn stats(&self) -> PoolStats;

    /// Use these credentials for every physical connection opened from now on.
    fn update_credentials(&self, user_name: &str, password: &str);

    /// Evict idle connections now; connections in use are closed when released if they predate
    /// the last credential update.
    async fn drain(&self);

    /// Idempotent and bounded in time.
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Builds pools from validated properties.
#[async_trait]
pub trait PoolFactory: Send + Sync + 'static {
    type Pool: TenantPool;

    async fn create(&self, tenant: &TenantId, props: &DatabaseProperties) -> Result<Self::Pool, DataSourceError>;
}
