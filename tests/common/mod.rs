//! Stub pool factory shared by the integration tests.
//!
//! The url drives behavior: a url containing `fail-create` makes construction fail, one
//! containing `fail-connect` yields a pool whose connections never verify, and one containing
//! `slow-create` takes 30ms to build. The last path segment is the "database" name.
//! Attached pools publish one `{tenant}.{poolName}.pool.ConnectivityCheck` into the factory's
//! health registry and withdraw it on close.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenant_datasource::pool::{HealthCheck, HealthCheckRegistry, HealthStatus};
use tenant_datasource::{DataSourceError, DatabaseProperties, PoolFactory, PoolStats, TenantId, TenantPool};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct StubConnection {
    pub pool_id: u64,
    pub tenant: TenantId,
    pub database: String,
}

pub struct StubPool {
    pub id: u64,
    pub tenant: TenantId,
    pub database: String,
    name: String,
    fail_connect: bool,
    connect_attempts: Arc<AtomicU32>,
    credentials: Mutex<(String, String)>,
    closed: AtomicBool,
    drains: AtomicU32,
    owner: Uuid,
    health: Arc<HealthCheckRegistry>,
}

struct AlwaysUp;

#[async_trait]
impl HealthCheck for AlwaysUp {
    async fn check(&self) -> HealthStatus {
        HealthStatus::healthy()
    }
}

impl StubPool {
    pub fn credentials(&self) -> (String, String) {
        self.credentials.lock().unwrap().clone()
    }

    pub fn drain_count(&self) -> u32 {
        self.drains.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TenantPool for StubPool {
    type Connection = StubConnection;

    fn name(&self) -> &str {
        &self.name
    }

    fn attach_instrumentation(&self, tenant: &TenantId) {
        self.health.register(
            format!("{}.{}.pool.ConnectivityCheck", tenant, self.name),
            self.owner,
            Arc::new(AlwaysUp),
        );
    }

    async fn acquire(&self) -> Result<StubConnection, DataSourceError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DataSourceError::Pool(format!("pool {} is closed", self.name)));
        }
        Ok(StubConnection {
            pool_id: self.id,
            tenant: self.tenant.clone(),
            database: self.database.clone(),
        })
    }

    async fn check_connection(&self) -> Result<(), DataSourceError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(DataSourceError::Pool("connection refused".into()));
        }
        self.acquire().await.map(|_| ())
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            total: 1,
            active: 0,
            idle: 1,
            pending: 0,
        }
    }

    fn update_credentials(&self, user_name: &str, password: &str) {
        *self.credentials.lock().unwrap() = (user_name.to_string(), password.to_string());
    }

    async fn drain(&self) {
        self.drains.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.health.unregister_owned(self.owner);
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct StubFactory {
    next_id: AtomicU64,
    pub create_attempts: Arc<AtomicU32>,
    pub connect_attempts: Arc<AtomicU32>,
    pub health: Arc<HealthCheckRegistry>,
}

impl StubFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory plus handles to its attempt counters, for tests that move the factory into a registry.
    pub fn with_counters() -> (Self, Arc<AtomicU32>, Arc<AtomicU32>) {
        let factory = Self::default();
        let creates = Arc::clone(&factory.create_attempts);
        let connects = Arc::clone(&factory.connect_attempts);
        (factory, creates, connects)
    }
}

#[async_trait]
impl PoolFactory for StubFactory {
    type Pool = StubPool;

    async fn create(&self, tenant: &TenantId, props: &DatabaseProperties) -> Result<StubPool, DataSourceError> {
        self.create_attempts.fetch_add(1, Ordering::SeqCst);
        if props.url.contains("slow-create") {
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        if props.url.contains("fail-create") {
            return Err(DataSourceError::Pool("server unreachable".into()));
        }
        let database = props.url.rsplit('/').next().unwrap_or_default().to_string();
        Ok(StubPool {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            tenant: tenant.clone(),
            database,
            name: props.pool_name.clone(),
            fail_connect: props.url.contains("fail-connect"),
            connect_attempts: Arc::clone(&self.connect_attempts),
            credentials: Mutex::new((props.user_name.clone(), props.password.clone())),
            closed: AtomicBool::new(false),
            drains: AtomicU32::new(0),
            owner: Uuid::new_v4(),
            health: Arc::clone(&self.health),
        })
    }
}

/// Valid properties for `database` with fast retries.
pub fn props(database: &str) -> DatabaseProperties {
    let mut props = DatabaseProperties::new(format!("postgres://localhost/{}", database), "user", "secret")
        .with_pool_name(format!("{}Pool", database));
    props.data_source_retry_delay_ms = 1;
    props.connection_retry_delay_ms = 1;
    props
}

pub fn tenant(id: &str) -> TenantId {
    TenantId::parse(id).unwrap()
}
