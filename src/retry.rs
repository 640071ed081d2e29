//! Retry loops for pool construction and first connection.

use crate::config::{validate_properties, DatabaseProperties};
use crate::credentials::CredentialsProvider;
use crate::error::DataSourceError;
use crate::pool::{PoolFactory, TenantPool};
use crate::tenant::TenantId;
use std::sync::Arc;
use std::time::Duration;

/// Number of extra attempts after the first, and the pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        RetryPolicy { retries, delay }
    }

    pub fn data_source(props: &DatabaseProperties) -> Self {
        Self::new(props.data_source_retry_count, Duration::from_millis(props.data_source_retry_delay_ms))
    }

    pub fn connection(props: &DatabaseProperties) -> Self {
        Self::new(props.connection_retry_count, Duration::from_millis(props.connection_retry_delay_ms))
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Build a pool, retrying failed attempts. Before each retry the username and password are
/// re-read from `provider` so a rotated secret gets picked up. Validation faults are returned
/// immediately without any connection attempt.
pub async fn create_pool_with_retry<F: PoolFactory>(
    factory: &F,
    tenant: &TenantId,
    props: &DatabaseProperties,
    provider: Option<&Arc<dyn CredentialsProvider>>,
    policy: RetryPolicy,
) -> Result<F::Pool, DataSourceError> {
    validate_properties(tenant, props)?;
    let mut props = props.clone();
    let mut remaining = policy.retries;
    let mut attempt = 1u32;
    loop {
        let err = match factory.create(tenant, &props).await {
            Ok(pool) => return Ok(pool),
            Err(e) => e,
        };
        if !err.is_retryable() {
            return Err(err);
        }
        if remaining == 0 {
            tracing::error!(tenant_id = %tenant, attempts = attempt, "datasource creation failed: {}", err);
            return Err(DataSourceError::Construction {
                tenant: tenant.to_string(),
                attempts: attempt,
                message: err.to_string(),
            });
        }
        if let Some(provider) = provider {
            props.user_name = provider.user_name();
            props.password = provider.password();
        }
        remaining -= 1;
        tracing::warn!(tenant_id = %tenant, attempt, remaining, "datasource creation failed, retrying: {}", err);
        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}

/// Acquire and verify a connection, retrying until the policy is exhausted.
pub async fn verify_connection_with_retry<P: TenantPool>(
    pool: &P,
    tenant: &TenantId,
    policy: RetryPolicy,
) -> Result<(), DataSourceError> {
    let mut remaining = policy.retries;
    let mut attempt = 1u32;
    loop {
        let err = match pool.check_connection().await {
            Ok(()) => {
                tracing::debug!(tenant_id = %tenant, attempt, "connection verified");
                return Ok(());
            }
            Err(e) => e,
        };
        if remaining == 0 {
            tracing::error!(tenant_id = %tenant, attempts = attempt, "connection acquisition failed: {}", err);
            return Err(DataSourceError::Connection {
                tenant: tenant.to_string(),
                attempts: attempt,
                message: err.to_string(),
            });
        }
        remaining -= 1;
        tracing::warn!(tenant_id = %tenant, attempt, remaining, "connection acquisition failed, retrying: {}", err);
        attempt += 1;
        tokio::time::sleep(policy.delay).await;
    }
}
