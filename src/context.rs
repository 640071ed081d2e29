//! Tenant context: which tenant the current unit of work is for.
//!
//! A unit of work is a future run through [`TenantContext::scope`] (or [`TenantContext::with_tenant`]).
//! The binding lives in a task-local slot, so it follows the task across worker threads and
//! disappears when the scoped future completes, whether it returns, errors, or panics.

use crate::error::DataSourceError;
use crate::tenant::TenantId;
use std::cell::RefCell;
use std::future::Future;

tokio::task_local! {
    static CURRENT_TENANT: RefCell<Option<TenantId>>;
}

/// Mode-aware accessor for the task-local tenant binding. Cheap to copy.
#[derive(Clone, Copy, Debug)]
pub struct TenantContext {
    multitenancy_enabled: bool,
}

impl TenantContext {
    pub fn new(multitenancy_enabled: bool) -> Self {
        TenantContext { multitenancy_enabled }
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.multitenancy_enabled
    }

    /// Run `f` as a unit of work with an empty binding. Nested scopes shadow the outer binding
    /// and restore it when they finish.
    pub async fn scope<F>(&self, f: F) -> F::Output
    where
        F: Future,
    {
        CURRENT_TENANT.scope(RefCell::new(None), f).await
    }

    /// Bind `tenant` and run `f` as a unit of work. Fails before running `f` if the id is rejected.
    pub async fn with_tenant<F>(&self, tenant: Option<&str>, f: F) -> Result<F::Output, DataSourceError>
    where
        F: Future,
    {
        let bound = self.resolve(tenant)?;
        Ok(CURRENT_TENANT.scope(RefCell::new(Some(bound)), f).await)
    }

    /// Bind a tenant for the rest of the current unit of work.
    ///
    /// Single-tenant mode always binds the reserved default id. Multi-tenant mode rejects a
    /// missing or blank id rather than substituting anything.
    pub fn set_current_tenant(&self, tenant: Option<&str>) -> Result<TenantId, DataSourceError> {
        let bound = self.resolve(tenant)?;
        CURRENT_TENANT
            .try_with(|slot| *slot.borrow_mut() = Some(bound.clone()))
            .map_err(|_| DataSourceError::NoTenantScope)?;
        tracing::debug!(tenant_id = %bound, "current tenant set");
        Ok(bound)
    }

    /// The bound tenant. Single-tenant mode falls back to the default id when nothing is bound.
    pub fn current_tenant(&self) -> Result<TenantId, DataSourceError> {
        let bound = CURRENT_TENANT.try_with(|slot| slot.borrow().clone()).ok().flatten();
        match bound {
            Some(id) => Ok(id),
            None if !self.multitenancy_enabled => Ok(TenantId::default_tenant()),
            None => {
                tracing::error!("no tenant found in context in multitenant mode");
                Err(DataSourceError::TenantNotFound)
            }
        }
    }

    pub fn has_tenant(&self) -> bool {
        CURRENT_TENANT
            .try_with(|slot| slot.borrow().is_some())
            .unwrap_or(false)
    }

    /// Remove the binding. Safe to call outside a unit of work.
    pub fn clear(&self) {
        let previous = CURRENT_TENANT.try_with(|slot| slot.borrow_mut().take()).ok().flatten();
        if let Some(tenant) = previous {
            tracing::debug!(tenant_id = %tenant, "cleared tenant context");
        }
    }

    fn resolve(&self, tenant: Option<&str>) -> Result<TenantId, DataSourceError> {
        if !self.multitenancy_enabled {
            return Ok(TenantId::default_tenant());
        }
        tenant.and_then(TenantId::parse).ok_or_else(|| {
            tracing::error!("attempted to set null or empty tenant in multitenant mode");
            DataSourceError::TenantNotFound
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_clear_in_multi_tenant_mode() {
        let ctx = TenantContext::new(true);
        ctx.scope(async {
            assert!(!ctx.has_tenant());
            assert!(matches!(ctx.current_tenant(), Err(DataSourceError::TenantNotFound)));

            ctx.set_current_tenant(Some(" t1 ")).unwrap();
            assert!(ctx.has_tenant());
            assert_eq!(ctx.current_tenant().unwrap().as_str(), "t1");

            ctx.clear();
            assert!(!ctx.has_tenant());
            assert!(matches!(ctx.current_tenant(), Err(DataSourceError::TenantNotFound)));
        })
        .await;
    }

    #[tokio::test]
    async fn blank_ids_are_rejected_in_multi_tenant_mode() {
        let ctx = TenantContext::new(true);
        ctx.scope(async {
            for bad in [None, Some(""), Some("   ")] {
                assert!(matches!(ctx.set_current_tenant(bad), Err(DataSourceError::TenantNotFound)));
            }
            assert!(!ctx.has_tenant());
        })
        .await;
    }

    #[tokio::test]
    async fn single_tenant_mode_forces_default() {
        let ctx = TenantContext::new(false);
        ctx.scope(async {
            assert!(ctx.current_tenant().unwrap().is_default());
            for input in [None, Some(""), Some("t1")] {
                assert!(ctx.set_current_tenant(input).unwrap().is_default());
                assert!(ctx.current_tenant().unwrap().is_default());
            }
        })
        .await;
    }

    #[tokio::test]
    async fn binding_does_not_outlive_scope() {
        let ctx = TenantContext::new(true);
        ctx.with_tenant(Some("t1"), async {
            assert_eq!(ctx.current_tenant().unwrap().as_str(), "t1");
        })
        .await
        .unwrap();
        assert!(!ctx.has_tenant());
        assert!(ctx.current_tenant().is_err());
    }

    #[tokio::test]
    async fn nested_scope_restores_outer_binding() {
        let ctx = TenantContext::new(true);
        ctx.with_tenant(Some("outer"), async {
            ctx.with_tenant(Some("inner"), async {
                assert_eq!(ctx.current_tenant().unwrap().as_str(), "inner");
            })
            .await
            .unwrap();
            assert_eq!(ctx.current_tenant().unwrap().as_str(), "outer");
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn set_outside_scope_is_an_error() {
        let ctx = TenantContext::new(true);
        assert!(matches!(ctx.set_current_tenant(Some("t1")), Err(DataSourceError::NoTenantScope)));
        ctx.clear();
    }

    #[tokio::test]
    async fn concurrent_scopes_are_isolated() {
        let ctx = TenantContext::new(true);
        let mut handles = Vec::new();
        for i in 0..16 {
            handles.push(tokio::spawn(async move {
                let id = format!("tenant-{}", i);
                ctx.with_tenant(Some(id.as_str()), async {
                    tokio::task::yield_now().await;
                    ctx.current_tenant().unwrap().as_str() == id
                })
                .await
                .unwrap()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
    }
}
