//! Tenant-aware PostgreSQL connection pools: one pool per tenant, routed by the tenant bound to
//! the current task, with hot add/update/remove and scheduled credential rotation.

pub mod config;
pub mod context;
pub mod credentials;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod pool;
pub mod provision;
pub mod registry;
pub mod response;
pub mod retry;
pub mod routes;
pub mod routing;
pub mod scheduler;
pub mod state;
pub mod tenant;

pub use config::{load_from_path, DataSourcesConfig, DatabaseProperties};
pub use context::TenantContext;
pub use credentials::{CredentialsProvider, CredentialsProviderResolver};
pub use error::{AppError, ConfigError, CredentialsError, DataSourceError};
pub use pool::{HealthCheckRegistry, MetricRegistry, PgPoolFactory, PgTenantPool, PoolFactory, PoolStats, TenantPool};
pub use provision::{ensure_database_exists, ensure_databases, with_provider_credentials};
pub use registry::{InitReport, RefreshSummary, TenantRegistry};
pub use retry::RetryPolicy;
pub use routes::{admin_routes, api_routes, app, common_routes, datasource_routes};
pub use routing::RoutingDataSource;
pub use scheduler::{CredentialRefreshScheduler, RefreshHandle};
pub use state::AppState;
pub use tenant::{TenantId, DEFAULT_TENANT_ID};
