//! Tenant-routed API. Every route runs inside a tenant scope bound from `X-Tenant-ID`.

use crate::extractors::bind_tenant;
use crate::handlers::api::{current_datasource, current_tenant};
use crate::pool::{PgPoolFactory, PoolFactory};
use crate::state::AppState;
use axum::{middleware, routing::get, Router};

pub fn api_routes<F: PoolFactory>(state: AppState<F>) -> Router {
    let context = state.registry.context();
    Router::new()
        .route("/api/v1/tenant", get(current_tenant::<F>))
        .route_layer(middleware::from_fn_with_state(context, bind_tenant))
        .with_state(state)
}

/// Postgres-only data route: `GET /api/v1/datasource`.
pub fn datasource_routes(state: AppState<PgPoolFactory>) -> Router {
    let context = state.registry.context();
    Router::new()
        .route("/api/v1/datasource", get(current_datasource))
        .route_layer(middleware::from_fn_with_state(context, bind_tenant))
        .with_state(state)
}
