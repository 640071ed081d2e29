//! Common routes: health, readiness, version.

use crate::pool::PoolFactory;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyBody {
    status: &'static str,
    tenants: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failing: Vec<String>,
}

async fn health() -> Json<HealthBody> {
    Json(HealthBody { status: "ok" })
}

/// 503 when any pool health check fails.
async fn ready<F: PoolFactory>(State(state): State<AppState<F>>) -> (StatusCode, Json<ReadyBody>) {
    let report = state.registry.check_health().await;
    let failing: Vec<String> = report
        .checks
        .iter()
        .filter(|(_, s)| !s.healthy)
        .map(|(name, _)| name.clone())
        .collect();
    let tenants = state.registry.tenant_ids().len();
    if report.healthy {
        (StatusCode::OK, Json(ReadyBody { status: "ok", tenants, failing }))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadyBody {
                status: "degraded",
                tenants,
                failing,
            }),
        )
    }
}

async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health, GET /ready, GET /version.
pub fn common_routes<F: PoolFactory>(state: AppState<F>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready::<F>))
        .route("/version", get(version))
        .with_state(state)
}
