//! Credentials providers: the capability a tenant pool asks for its username and password.

mod resolver;

pub use resolver::{CredentialsProviderResolver, ProviderFactory, ENV_CREDENTIALS_PROVIDER};

use crate::error::CredentialsError;
use crate::tenant::TenantId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Source of database credentials for one tenant. Implementations must be cheap to query;
/// `refresh_credentials` may do I/O.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    fn user_name(&self) -> String;

    fn password(&self) -> String;

    /// Every credential-related setting this provider knows about, for diagnostics.
    fn all_credentials_config(&self) -> HashMap<String, String>;

    async fn refresh_credentials(&self) -> Result<(), CredentialsError>;

    fn is_refresh_in_progress(&self) -> bool;
}

/// Serves the username and password from the tenant's own properties. Refresh is a no-op.
pub struct PropertiesCredentialsProvider {
    user_name: String,
    password: String,
}

impl PropertiesCredentialsProvider {
    pub fn new(user_name: impl Into<String>, password: impl Into<String>) -> Self {
        PropertiesCredentialsProvider {
            user_name: user_name.into(),
            password: password.into(),
        }
    }
}

#[async_trait]
impl CredentialsProvider for PropertiesCredentialsProvider {
    fn user_name(&self) -> String {
        self.user_name.clone()
    }

    fn password(&self) -> String {
        self.password.clone()
    }

    fn all_credentials_config(&self) -> HashMap<String, String> {
        HashMap::from([
            ("username".to_string(), self.user_name.clone()),
            ("password".to_string(), self.password.clone()),
        ])
    }

    async fn refresh_credentials(&self) -> Result<(), CredentialsError> {
        Ok(())
    }

    fn is_refresh_in_progress(&self) -> bool {
        false
    }
}

/// Reads `<TENANT>_DB_USERNAME` / `<TENANT>_DB_PASSWORD` from the environment, re-reading on each refresh.
pub struct EnvCredentialsProvider {
    user_var: String,
    password_var: String,
    current: RwLock<(String, String)>,
    refreshing: AtomicBool,
}

impl EnvCredentialsProvider {
    /// Variables are derived from the tenant id; values read at construction seed the provider,
    /// falling back to `fallback` when a variable is unset.
    pub fn for_tenant(tenant: &TenantId, fallback: (&str, &str)) -> Self {
        let prefix = tenant.env_prefix();
        let user_var = format!("{}_DB_USERNAME", prefix);
        let password_var = format!("{}_DB_PASSWORD", prefix);
        let user = std::env::var(&user_var).unwrap_or_else(|_| fallback.0.to_string());
        let password = std::env::var(&password_var).unwrap_or_else(|_| fallback.1.to_string());
        EnvCredentialsProvider {
            user_var,
            password_var,
            current: RwLock::new((user, password)),
            refreshing: AtomicBool::new(false),
        }
    }

    fn read_env(&self) -> Result<(String, String), CredentialsError> {
        let user = std::env::var(&self.user_var)
            .map_err(|_| CredentialsError::Refresh(format!("{} is not set", self.user_var)))?;
        let password = std::env::var(&self.password_var)
            .map_err(|_| CredentialsError::Refresh(format!("{} is not set", self.password_var)))?;
        Ok((user, password))
    }
}

#[async_trait]
impl CredentialsProvider for EnvCredentialsProvider {
    fn user_name(&self) -> String {
        self.current.read().map(|c| c.0.clone()).unwrap_or_default()
    }

    fn password(&self) -> String {
        self.current.read().map(|c| c.1.clone()).unwrap_or_default()
    }

    fn all_credentials_config(&self) -> HashMap<String, String> {
        HashMap::from([
            ("usernameVariable".to_string(), self.user_var.clone()),
            ("passwordVariable".to_string(), self.password_var.clone()),
            ("username".to_string(), self.user_name()),
        ])
    }

    async fn refresh_credentials(&self) -> Result<(), CredentialsError> {
        self.refreshing.store(true, Ordering::SeqCst);
        let result = self.read_env();
        if let Ok(fresh) = &result {
            if let Ok(mut current) = self.current.write() {
                *current = fresh.clone();
            }
        }
        self.refreshing.store(false, Ordering::SeqCst);
        result.map(|_| ())
    }

    fn is_refresh_in_progress(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn properties_provider_serves_configured_values() {
        let p = PropertiesCredentialsProvider::new("app", "secret");
        p.refresh_credentials().await.unwrap();
        assert_eq!(p.user_name(), "app");
        assert_eq!(p.password(), "secret");
        assert_eq!(p.all_credentials_config().get("username").map(String::as_str), Some("app"));
        assert!(!p.is_refresh_in_progress());
    }

    #[tokio::test]
    async fn env_provider_rereads_on_refresh() {
        let tenant = TenantId::parse("env-provider-test").unwrap();
        std::env::remove_var("ENV_PROVIDER_TEST_DB_USERNAME");
        std::env::remove_var("ENV_PROVIDER_TEST_DB_PASSWORD");
        let p = EnvCredentialsProvider::for_tenant(&tenant, ("seed", "seed-pw"));
        assert_eq!(p.user_name(), "seed");

        assert!(p.refresh_credentials().await.is_err());
        assert_eq!(p.user_name(), "seed");

        std::env::set_var("ENV_PROVIDER_TEST_DB_USERNAME", "rotated");
        std::env::set_var("ENV_PROVIDER_TEST_DB_PASSWORD", "rotated-pw");
        p.refresh_credentials().await.unwrap();
        assert_eq!(p.user_name(), "rotated");
        assert_eq!(p.password(), "rotated-pw");
        assert!(!p.is_refresh_in_progress());
    }
}
