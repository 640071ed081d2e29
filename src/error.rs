//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("missing or invalid datasource properties for tenant '{tenant}': {fields:?}")]
    InvalidProperties { tenant: String, fields: Vec<&'static str> },
}

#[derive(Error, Debug)]
pub enum CredentialsError {
    /// Neither a shared instance nor a named factory could produce the provider.
    #[error("credentials provider '{name}' could not be loaded: {source}")]
    Load {
        name: String,
        #[source]
        source: BoxError,
    },
    #[error("credentials refresh failed: {0}")]
    Refresh(String),
}

#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("datasource for tenant '{tenant}' not created after {attempts} attempt(s), retry attempts exhausted: {message}")]
    Construction {
        tenant: String,
        attempts: u32,
        message: String,
    },
    #[error("connection for tenant '{tenant}' not obtained after {attempts} attempt(s), retry attempts exhausted: {message}")]
    Connection {
        tenant: String,
        attempts: u32,
        message: String,
    },
    #[error("no tenant found in context in multitenant mode")]
    TenantNotFound,
    #[error("tenant context used outside of a unit of work")]
    NoTenantScope,
    #[error("no datasource configured for tenant '{0}'")]
    TargetDataSourceNotFound(String),
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("pool: {0}")]
    Pool(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

impl DataSourceError {
    /// Whether a failed pool construction is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataSourceError::Config(_) | DataSourceError::Credentials(_) => false,
            DataSourceError::Db(sqlx::Error::Configuration(_)) => false,
            _ => true,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::DataSource(e) => match e {
                DataSourceError::Config(_) => (StatusCode::BAD_REQUEST, "bad_request"),
                DataSourceError::TenantNotFound | DataSourceError::NoTenantScope => {
                    (StatusCode::BAD_REQUEST, "tenant_not_found")
                }
                DataSourceError::TargetDataSourceNotFound(_) => (StatusCode::NOT_FOUND, "datasource_not_found"),
                DataSourceError::Construction { .. } | DataSourceError::Connection { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "datasource_unavailable")
                }
                DataSourceError::Credentials(_) => (StatusCode::INTERNAL_SERVER_ERROR, "credentials_error"),
                DataSourceError::Pool(_) | DataSourceError::Db(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
