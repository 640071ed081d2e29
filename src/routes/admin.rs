//! Admin routes for tenant lifecycle and pool inspection.

use crate::handlers::admin::{delete_tenant, list_tenants, pool_health, pool_metrics, put_tenant, refresh_credentials};
use crate::pool::PoolFactory;
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::limit::RequestBodyLimitLayer;

const ADMIN_BODY_LIMIT: usize = 64 * 1024;

pub fn admin_routes<F: PoolFactory>(state: AppState<F>) -> Router {
    Router::new()
        .route("/admin/tenants", get(list_tenants::<F>))
        .route("/admin/tenants/:tenant_id", put(put_tenant::<F>).delete(delete_tenant::<F>))
        .route("/admin/credentials/refresh", post(refresh_credentials::<F>))
        .route("/admin/metrics", get(pool_metrics::<F>))
        .route("/admin/health", get(pool_health::<F>))
        .layer(RequestBodyLimitLayer::new(ADMIN_BODY_LIMIT))
        .with_state(state)
}
