//! Tenant-routed handlers. Each runs inside the tenant scope set up by `bind_tenant`.

use crate::error::{AppError, DataSourceError};
use crate::pool::{PgPoolFactory, PoolFactory, TenantPool};
use crate::response::success_one_ok;
use crate::state::AppState;
use crate::tenant::TenantId;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::Serialize;

#[derive(Serialize)]
pub struct BoundPool {
    pub tenant_id: TenantId,
    pub pool_name: String,
}

#[derive(Serialize)]
pub struct DataSourceInfo {
    pub tenant_id: TenantId,
    pub database: String,
}

/// Which pool the current request routes to.
pub async fn current_tenant<F: PoolFactory>(State(state): State<AppState<F>>) -> Result<impl IntoResponse, AppError> {
    let router = state.registry.router();
    let tenant_id = router.determine_current_lookup_key()?;
    let pool = router.resolve_pool()?;
    Ok(success_one_ok(BoundPool {
        tenant_id,
        pool_name: pool.name().to_string(),
    }))
}

/// Ask the routed database which database it is.
pub async fn current_datasource(State(state): State<AppState<PgPoolFactory>>) -> Result<impl IntoResponse, AppError> {
    let router = state.registry.router();
    let tenant_id = router.determine_current_lookup_key()?;
    let mut conn = router.get_connection().await?;
    let database: String = sqlx::query_scalar("SELECT current_database()")
        .fetch_one(&mut *conn)
        .await
        .map_err(DataSourceError::from)?;
    Ok(success_one_ok(DataSourceInfo { tenant_id, database }))
}
