//! Tenant registry: owns every tenant's pool, properties and credentials provider.
//!
//! Structural changes (add, update, remove, credential swap) run one at a time behind a single
//! async lock. Lookups never take that lock; they read the entry map or the routing snapshot,
//! both of which are only ever replaced entry-by-entry or wholesale, so a reader sees either the
//! old pool or the new one.

use crate::config::{DataSourcesConfig, DatabaseProperties};
use crate::context::TenantContext;
use crate::credentials::{CredentialsProvider, CredentialsProviderResolver};
use crate::error::{ConfigError, DataSourceError};
use crate::pool::{HealthCheckRegistry, HealthStatus, MetricRegistry, PoolFactory, PoolStats, TenantPool};
use crate::retry::{create_pool_with_retry, verify_connection_with_retry, RetryPolicy};
use crate::routing::RoutingDataSource;
use crate::tenant::TenantId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

const REFRESH_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct TenantEntry<P> {
    pub tenant_id: TenantId,
    pub properties: DatabaseProperties,
    pub pool: Arc<P>,
    pub updated_at: DateTime<Utc>,
}

impl<P> Clone for TenantEntry<P> {
    fn clone(&self) -> Self {
        TenantEntry {
            tenant_id: self.tenant_id.clone(),
            properties: self.properties.clone(),
            pool: Arc::clone(&self.pool),
            updated_at: self.updated_at,
        }
    }
}

/// Admin-facing view of one tenant.
#[derive(Clone, Debug, Serialize)]
pub struct TenantSummary {
    pub tenant_id: TenantId,
    pub pool_name: String,
    pub stats: PoolStats,
    pub credentials_provider: Option<String>,
    pub credentials_refresh_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of startup initialization.
#[derive(Debug, Default, Serialize)]
pub struct InitReport {
    pub ready: Vec<TenantId>,
    pub failed: Vec<(TenantId, String)>,
}

/// Outcome of one credential refresh sweep.
#[derive(Debug, Default, Serialize)]
pub struct RefreshSummary {
    pub refreshed: Vec<TenantId>,
    pub failed: Vec<(TenantId, String)>,
    pub skipped: Vec<TenantId>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: BTreeMap<String, HealthStatus>,
}

/// Clears the sweep flag even if the sweep panics.
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct TenantRegistry<F: PoolFactory> {
    factory: Arc<F>,
    resolver: Arc<CredentialsProviderResolver>,
    context: TenantContext,
    entries: RwLock<HashMap<TenantId, TenantEntry<F::Pool>>>,
    providers: RwLock<HashMap<TenantId, Arc<dyn CredentialsProvider>>>,
    structural: Mutex<()>,
    router: Arc<RoutingDataSource<F::Pool>>,
    refresh_running: AtomicBool,
    health: Arc<HealthCheckRegistry>,
    metrics: Arc<MetricRegistry>,
}

impl<F: PoolFactory> TenantRegistry<F> {
    /// Empty registry with the built-in credentials providers and its own instrumentation registries.
    pub fn new(factory: F, context: TenantContext) -> Self {
        TenantRegistry {
            factory: Arc::new(factory),
            resolver: Arc::new(CredentialsProviderResolver::with_builtin()),
            context,
            entries: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
            structural: Mutex::new(()),
            router: Arc::new(RoutingDataSource::new(context)),
            refresh_running: AtomicBool::new(false),
            health: Arc::new(HealthCheckRegistry::new()),
            metrics: Arc::new(MetricRegistry::new()),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<CredentialsProviderResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Share the registries the factory attaches pool checks and gauges to.
    pub fn with_instrumentation(mut self, health: Arc<HealthCheckRegistry>, metrics: Arc<MetricRegistry>) -> Self {
        self.health = health;
        self.metrics = metrics;
        self
    }

    /// Build every configured pool. Tenants are built in parallel in multi-tenant mode and a
    /// failing tenant is reported without affecting the others. In single-tenant mode the one
    /// default pool must come up, so its failure is returned.
    pub async fn initialize(&self, config: &DataSourcesConfig) -> Result<InitReport, DataSourceError> {
        let _guard = self.structural.lock().await;
        let mut report = InitReport::default();

        if !self.context.is_multi_tenant() {
            let props = config.default.clone().ok_or_else(|| {
                ConfigError::Validation("multitenancy is disabled but no default datasource properties are configured".into())
            })?;
            let tenant = TenantId::default_tenant();
            let (pool, props, provider) = self.build(&tenant, props).await?;
            self.commit(&tenant, props, pool, provider);
            self.refresh_router();
            report.ready.push(tenant);
            tracing::info!("single-tenant datasource initialized");
            return Ok(report);
        }

        let mut tasks = JoinSet::new();
        for (tenant, props) in &config.tenants {
            let provider = match self.resolve_provider(tenant, props) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::error!(tenant_id = %tenant, "failed to initialize datasource: {}", e);
                    report.failed.push((tenant.clone(), e.to_string()));
                    continue;
                }
            };
            let factory = Arc::clone(&self.factory);
            let tenant = tenant.clone();
            let props = props.clone();
            tasks.spawn(async move {
                let built = init_data_source(&*factory, &tenant, props, provider.as_ref()).await;
                (tenant, built.map(|(pool, props)| (pool, props, provider)))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((tenant, Ok((pool, props, provider)))) => {
                    self.commit(&tenant, props, pool, provider);
                    report.ready.push(tenant);
                }
                Ok((tenant, Err(e))) => {
                    tracing::error!(tenant_id = %tenant, "failed to initialize datasource: {}", e);
                    report.failed.push((tenant, e.to_string()));
                }
                Err(e) => tracing::error!("tenant initialization task aborted: {}", e),
            }
        }
        self.refresh_router();
        report.ready.sort();
        report.failed.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::info!(ready = report.ready.len(), failed = report.failed.len(), "tenant datasources initialized");
        Ok(report)
    }

    /// Add a tenant or replace its pool.
    ///
    /// Returns `Ok(false)` without touching anything when multi-tenancy is off, the id is blank,
    /// or no properties were given. A failure while building the new pool is returned as an error
    /// and leaves any existing pool serving. The old pool is closed only after the new one is routable.
    ///
    /// When `properties` names no credentials provider, the provider already registered for the
    /// tenant (from an earlier add or [`Self::register_credentials_provider`]) is kept, and its
    /// username and password take precedence over the ones in `properties`. Name a provider, or
    /// remove the registered one first, to make new credentials in `properties` take effect.
    pub async fn add_or_update(
        &self,
        tenant_id: &str,
        properties: Option<DatabaseProperties>,
    ) -> Result<bool, DataSourceError> {
        if !self.context.is_multi_tenant() {
            tracing::warn!(tenant_id, "add/update rejected: multitenancy is disabled");
            return Ok(false);
        }
        let Some(tenant) = TenantId::parse(tenant_id) else {
            tracing::warn!("add/update rejected: tenant id is blank");
            return Ok(false);
        };
        let Some(props) = properties else {
            tracing::warn!(tenant_id = %tenant, "add/update rejected: no datasource properties");
            return Ok(false);
        };

        let _guard = self.structural.lock().await;
        let (pool, props, provider) = self.build(&tenant, props).await?;
        let previous = self.commit(&tenant, props, pool, provider);
        self.refresh_router();
        if let Some(old) = previous {
            old.pool.close().await;
        }
        tracing::info!(tenant_id = %tenant, "datasource added or updated");
        Ok(true)
    }

    /// Remove a tenant and close its pool. Removing an unknown tenant succeeds.
    ///
    /// Returns `Ok(false)` without touching anything when multi-tenancy is off or the id is blank.
    pub async fn remove(&self, tenant_id: &str) -> Result<bool, DataSourceError> {
        if !self.context.is_multi_tenant() {
            tracing::warn!(tenant_id, "remove rejected: multitenancy is disabled");
            return Ok(false);
        }
        let Some(tenant) = TenantId::parse(tenant_id) else {
            tracing::warn!("remove rejected: tenant id is blank");
            return Ok(false);
        };

        let _guard = self.structural.lock().await;
        let removed = self.entries.write().ok().and_then(|mut e| e.remove(&tenant));
        self.remove_credentials_provider(&tenant);
        self.refresh_router();
        match removed {
            Some(entry) => {
                entry.pool.close().await;
                tracing::info!(tenant_id = %tenant, "datasource removed");
            }
            None => tracing::info!(tenant_id = %tenant, "remove: no datasource registered"),
        }
        Ok(true)
    }

    /// Provider named in `props`, or the one already registered for the tenant.
    fn resolve_provider(
        &self,
        tenant: &TenantId,
        props: &DatabaseProperties,
    ) -> Result<Option<Arc<dyn CredentialsProvider>>, DataSourceError> {
        match props.credentials_provider_name() {
            Some(name) => Ok(Some(self.resolver.resolve(name, tenant, props)?)),
            None => Ok(self.credentials_provider(tenant)),
        }
    }

    async fn build(
        &self,
        tenant: &TenantId,
        props: DatabaseProperties,
    ) -> Result<(F::Pool, DatabaseProperties, Option<Arc<dyn CredentialsProvider>>), DataSourceError> {
        let provider = self.resolve_provider(tenant, &props)?;
        let (pool, props) = init_data_source(&*self.factory, tenant, props, provider.as_ref()).await?;
        Ok((pool, props, provider))
    }

    /// Insert or replace the entry and provider, then publish the new pool's checks and gauges.
    /// Returns the displaced entry.
    fn commit(
        &self,
        tenant: &TenantId,
        properties: DatabaseProperties,
        pool: F::Pool,
        provider: Option<Arc<dyn CredentialsProvider>>,
    ) -> Option<TenantEntry<F::Pool>> {
        if let Some(provider) = provider {
            self.register_credentials_provider(tenant, provider);
        }
        let pool = Arc::new(pool);
        let entry = TenantEntry {
            tenant_id: tenant.clone(),
            properties,
            pool: Arc::clone(&pool),
            updated_at: Utc::now(),
        };
        let previous = self.entries.write().ok().and_then(|mut e| e.insert(tenant.clone(), entry));
        pool.attach_instrumentation(tenant);
        previous
    }

    fn refresh_router(&self) {
        let targets = self
            .entries
            .read()
            .map(|e| e.iter().map(|(id, entry)| (id.clone(), Arc::clone(&entry.pool))).collect())
            .unwrap_or_default();
        self.router.replace_targets(targets);
    }

    /// Register (or replace) the credentials provider for a tenant.
    pub fn register_credentials_provider(&self, tenant: &TenantId, provider: Arc<dyn CredentialsProvider>) {
        if let Ok(mut providers) = self.providers.write() {
            providers.insert(tenant.clone(), provider);
        }
    }

    pub fn credentials_provider(&self, tenant: &TenantId) -> Option<Arc<dyn CredentialsProvider>> {
        self.providers.read().ok()?.get(tenant).cloned()
    }

    pub fn remove_credentials_provider(&self, tenant: &TenantId) -> Option<Arc<dyn CredentialsProvider>> {
        self.providers.write().ok()?.remove(tenant)
    }

    pub fn pool(&self, tenant_id: &str) -> Option<Arc<F::Pool>> {
        self.entries.read().ok()?.get(tenant_id).map(|e| Arc::clone(&e.pool))
    }

    pub fn properties(&self, tenant_id: &str) -> Option<DatabaseProperties> {
        self.entries.read().ok()?.get(tenant_id).map(|e| e.properties.clone())
    }

    pub fn entry(&self, tenant_id: &str) -> Option<TenantEntry<F::Pool>> {
        self.entries.read().ok()?.get(tenant_id).cloned()
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self
            .entries
            .read()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    pub fn summaries(&self) -> Vec<TenantSummary> {
        let entries: Vec<TenantEntry<F::Pool>> = self
            .entries
            .read()
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default();
        let mut summaries: Vec<TenantSummary> = entries
            .into_iter()
            .map(|e| TenantSummary {
                pool_name: e.pool.name().to_string(),
                stats: e.pool.stats(),
                credentials_provider: e.properties.credentials_provider_name().map(str::to_string),
                credentials_refresh_enabled: e.properties.credentials_refresh_enabled,
                updated_at: e.updated_at,
                tenant_id: e.tenant_id,
            })
            .collect();
        summaries.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        summaries
    }

    pub fn router(&self) -> Arc<RoutingDataSource<F::Pool>> {
        Arc::clone(&self.router)
    }

    pub fn context(&self) -> TenantContext {
        self.context
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.context.is_multi_tenant()
    }

    pub fn health_checks(&self) -> Arc<HealthCheckRegistry> {
        Arc::clone(&self.health)
    }

    pub fn metrics(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Run every registered pool health check.
    pub async fn check_health(&self) -> HealthReport {
        let checks = self.health.run_all().await;
        HealthReport {
            healthy: checks.values().all(|s| s.healthy),
            checks,
        }
    }

    /// Close every pool and stop routing. Used on shutdown.
    pub async fn close_all(&self) {
        let _guard = self.structural.lock().await;
        let drained: Vec<TenantEntry<F::Pool>> = self
            .entries
            .write()
            .map(|mut e| e.drain().map(|(_, entry)| entry).collect())
            .unwrap_or_default();
        self.router.replace_targets(HashMap::new());
        for entry in &drained {
            entry.pool.close().await;
        }
        tracing::info!(closed = drained.len(), "all datasources closed");
    }

    /// One credential refresh sweep over tenants with refresh enabled.
    ///
    /// Returns `None` when a sweep is already running. Per-tenant failures are logged and
    /// reported in the summary; the affected pool keeps running on its previous state.
    pub async fn refresh_credentials(&self) -> Option<RefreshSummary> {
        if self
            .refresh_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::info!("credential refresh already running; skipping this run");
            return None;
        }
        let _running = SweepGuard(&self.refresh_running);

        let mut candidates: Vec<TenantId> = self
            .entries
            .read()
            .map(|e| {
                e.values()
                    .filter(|entry| entry.properties.credentials_refresh_enabled)
                    .map(|entry| entry.tenant_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        candidates.sort();

        let mut summary = RefreshSummary::default();
        for tenant in candidates {
            match self.refresh_tenant(&tenant).await {
                Ok(true) => summary.refreshed.push(tenant),
                Ok(false) => summary.skipped.push(tenant),
                Err(e) => {
                    tracing::error!(tenant_id = %tenant, "credential refresh failed: {}", e);
                    summary.failed.push((tenant, e.to_string()));
                }
            }
        }
        tracing::info!(
            refreshed = summary.refreshed.len(),
            failed = summary.failed.len(),
            skipped = summary.skipped.len(),
            "credential refresh finished"
        );
        Some(summary)
    }

    /// Returns `Ok(false)` when the tenant was skipped.
    async fn refresh_tenant(&self, tenant: &TenantId) -> Result<bool, DataSourceError> {
        let _guard = self.structural.lock().await;
        let Some(entry) = self.entry(tenant.as_str()) else {
            return Ok(false);
        };
        let Some(provider) = self.credentials_provider(tenant) else {
            tracing::warn!(tenant_id = %tenant, "refresh enabled but no credentials provider registered");
            return Ok(false);
        };
        if provider.is_refresh_in_progress() {
            tracing::info!(tenant_id = %tenant, "provider refresh already in progress; skipping");
            return Ok(false);
        }

        provider.refresh_credentials().await?;
        let user_name = provider.user_name();
        let password = provider.password();
        entry.pool.update_credentials(&user_name, &password);
        if let Ok(mut entries) = self.entries.write() {
            if let Some(current) = entries.get_mut(tenant) {
                current.properties.user_name = user_name;
                current.properties.password = password;
                current.updated_at = Utc::now();
            }
        }

        entry.pool.drain().await;
        verify_connection_with_retry(&*entry.pool, tenant, RetryPolicy::connection(&entry.properties)).await?;
        tracing::info!(tenant_id = %tenant, "credentials refreshed");
        Ok(true)
    }
}

/// Build a ready pool for `tenant`.
///
/// Waits out any credential refresh in progress, lets the provider's username and password
/// override the configured ones, creates the pool with retry, then verifies a connection with
/// retry. A pool that never yields a connection is closed before the error returns.
pub async fn init_data_source<F: PoolFactory>(
    factory: &F,
    tenant: &TenantId,
    mut props: DatabaseProperties,
    provider: Option<&Arc<dyn CredentialsProvider>>,
) -> Result<(F::Pool, DatabaseProperties), DataSourceError> {
    if let Some(provider) = provider {
        if provider.is_refresh_in_progress() {
            tracing::info!(tenant_id = %tenant, "waiting for credential refresh to finish");
            while provider.is_refresh_in_progress() {
                tokio::time::sleep(REFRESH_POLL_INTERVAL).await;
            }
        }
        props.user_name = provider.user_name();
        props.password = provider.password();
    }

    let pool = create_pool_with_retry(factory, tenant, &props, provider, RetryPolicy::data_source(&props)).await?;
    if let Err(e) = verify_connection_with_retry(&pool, tenant, RetryPolicy::connection(&props)).await {
        pool.close().await;
        return Err(e);
    }
    Ok((pool, props))
}
