//! Admin handlers: list, add/update and remove tenants, refresh credentials, inspect pools.

use crate::config::DatabaseProperties;
use crate::error::AppError;
use crate::pool::PoolFactory;
use crate::response::{success_many, success_one_ok};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

#[derive(Serialize)]
pub struct TenantChange {
    pub tenant_id: String,
    pub applied: bool,
}

pub async fn list_tenants<F: PoolFactory>(State(state): State<AppState<F>>) -> impl IntoResponse {
    success_many(state.registry.summaries())
}

/// Body is the tenant's datasource properties. An empty body is treated as "no properties".
pub async fn put_tenant<F: PoolFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let properties = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        let props: DatabaseProperties = serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("invalid datasource properties: {}", e)))?;
        Some(props)
    };
    let applied = state.registry.add_or_update(&tenant_id, properties).await?;
    if !applied {
        return Err(AppError::BadRequest(format!(
            "tenant '{}' rejected: multitenancy disabled, blank id, or missing properties",
            tenant_id
        )));
    }
    Ok(success_one_ok(TenantChange {
        tenant_id: tenant_id.trim().to_string(),
        applied,
    }))
}

pub async fn delete_tenant<F: PoolFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let applied = state.registry.remove(&tenant_id).await?;
    if !applied {
        return Err(AppError::BadRequest("tenant id is blank".into()));
    }
    Ok(success_one_ok(TenantChange {
        tenant_id: tenant_id.trim().to_string(),
        applied,
    }))
}

/// Run one credential refresh sweep now. 409 when a sweep is already running.
pub async fn refresh_credentials<F: PoolFactory>(State(state): State<AppState<F>>) -> impl IntoResponse {
    match state.registry.refresh_credentials().await {
        Some(summary) => success_one_ok(summary).into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": { "code": "refresh_in_progress", "message": "a credential refresh is already running" }
            })),
        )
            .into_response(),
    }
}

pub async fn pool_metrics<F: PoolFactory>(State(state): State<AppState<F>>) -> impl IntoResponse {
    success_one_ok(state.registry.metrics().snapshot())
}

pub async fn pool_health<F: PoolFactory>(State(state): State<AppState<F>>) -> impl IntoResponse {
    let report = state.registry.check_health().await;
    let status = if report.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
