//! Routing façade: hands out connections from the pool of the tenant bound to the current task.

use crate::context::TenantContext;
use crate::error::DataSourceError;
use crate::pool::TenantPool;
use crate::tenant::TenantId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub type PoolSnapshot<P> = Arc<HashMap<TenantId, Arc<P>>>;

pub struct RoutingDataSource<P> {
    context: TenantContext,
    targets: RwLock<PoolSnapshot<P>>,
}

impl<P: TenantPool> RoutingDataSource<P> {
    pub fn new(context: TenantContext) -> Self {
        RoutingDataSource {
            context,
            targets: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn context(&self) -> TenantContext {
        self.context
    }

    /// Current set of routable pools. The returned map never changes.
    pub fn snapshot(&self) -> PoolSnapshot<P> {
        self.targets
            .read()
            .map(|t| Arc::clone(&*t))
            .unwrap_or_else(|poisoned| Arc::clone(&*poisoned.into_inner()))
    }

    /// Replace the whole target set in one step.
    pub fn replace_targets(&self, targets: HashMap<TenantId, Arc<P>>) {
        let count = targets.len();
        let fresh = Arc::new(targets);
        match self.targets.write() {
            Ok(mut t) => *t = fresh,
            Err(poisoned) => *poisoned.into_inner() = fresh,
        }
        tracing::debug!(targets = count, "routing targets refreshed");
    }

    /// Tenant bound to the calling task.
    pub fn determine_current_lookup_key(&self) -> Result<TenantId, DataSourceError> {
        self.context.current_tenant()
    }

    pub fn resolve_pool(&self) -> Result<Arc<P>, DataSourceError> {
        let tenant = self.determine_current_lookup_key()?;
        self.snapshot().get(&tenant).cloned().ok_or_else(|| {
            tracing::error!(tenant_id = %tenant, "cannot determine target datasource");
            DataSourceError::TargetDataSourceNotFound(tenant.to_string())
        })
    }

    /// Connection from the current tenant's pool. Never falls back to another tenant.
    pub async fn get_connection(&self) -> Result<P::Connection, DataSourceError> {
        let pool = self.resolve_pool()?;
        pool.acquire().await
    }

    pub fn tenant_ids(&self) -> Vec<TenantId> {
        let mut ids: Vec<TenantId> = self.snapshot().keys().cloned().collect();
        ids.sort();
        ids
    }
}
