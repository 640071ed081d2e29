//! Bind the request's tenant (from the `X-Tenant-ID` header) for the rest of the request.

use crate::context::TenantContext;
use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

/// Header name for tenant id.
pub const TENANT_ID_HEADER: &str = "X-Tenant-ID";

/// Trimmed, non-empty header value.
pub fn tenant_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(TENANT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Middleware: runs the request inside a tenant scope. In multi-tenant mode a missing or blank
/// header is rejected with `tenant_not_found`; in single-tenant mode the default tenant is bound.
pub async fn bind_tenant(State(context): State<TenantContext>, request: Request, next: Next) -> Response {
    let header = tenant_header(request.headers());
    context
        .scope(async move {
            if let Err(e) = context.set_current_tenant(header.as_deref()) {
                return AppError::from(e).into_response();
            }
            next.run(request).await
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_is_trimmed_and_blank_is_absent() {
        let mut headers = HeaderMap::new();
        assert_eq!(tenant_header(&headers), None);
        headers.insert(TENANT_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(tenant_header(&headers), None);
        headers.insert(TENANT_ID_HEADER, HeaderValue::from_static(" acme "));
        assert_eq!(tenant_header(&headers).as_deref(), Some("acme"));
    }
}
