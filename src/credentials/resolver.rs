//! Resolve a credentials provider by name: shared instance first, then a named per-tenant factory.

use crate::config::{DatabaseProperties, DEFAULT_CREDENTIALS_PROVIDER};
use crate::credentials::{CredentialsProvider, EnvCredentialsProvider, PropertiesCredentialsProvider};
use crate::error::{BoxError, CredentialsError};
use crate::tenant::TenantId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Name of the built-in environment-backed provider.
pub const ENV_CREDENTIALS_PROVIDER: &str = "env";

/// Builds a provider for one tenant.
pub type ProviderFactory =
    Arc<dyn Fn(&TenantId, &DatabaseProperties) -> Result<Arc<dyn CredentialsProvider>, BoxError> + Send + Sync>;

/// Lookup table populated at wiring time. Shared instances are process-wide singletons;
/// factories construct a fresh provider per tenant.
pub struct CredentialsProviderResolver {
    shared: RwLock<HashMap<String, Arc<dyn CredentialsProvider>>>,
    factories: RwLock<HashMap<String, ProviderFactory>>,
}

impl Default for CredentialsProviderResolver {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl CredentialsProviderResolver {
    /// Empty resolver: nothing resolves until registered.
    pub fn empty() -> Self {
        CredentialsProviderResolver {
            shared: RwLock::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Resolver with the `default` (properties) and `env` factories registered.
    pub fn with_builtin() -> Self {
        let resolver = Self::empty();
        resolver.register_factory(DEFAULT_CREDENTIALS_PROVIDER, |_tenant, props| {
            Ok(Arc::new(PropertiesCredentialsProvider::new(&props.user_name, &props.password))
                as Arc<dyn CredentialsProvider>)
        });
        resolver.register_factory(ENV_CREDENTIALS_PROVIDER, |tenant, props| {
            Ok(Arc::new(EnvCredentialsProvider::for_tenant(tenant, (props.user_name.as_str(), props.password.as_str())))
                as Arc<dyn CredentialsProvider>)
        });
        resolver
    }

    pub fn register_shared(&self, name: impl Into<String>, provider: Arc<dyn CredentialsProvider>) {
        if let Ok(mut shared) = self.shared.write() {
            shared.insert(name.into(), provider);
        }
    }

    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&TenantId, &DatabaseProperties) -> Result<Arc<dyn CredentialsProvider>, BoxError> + Send + Sync + 'static,
    {
        if let Ok(mut factories) = self.factories.write() {
            factories.insert(name.into(), Arc::new(factory) as ProviderFactory);
        }
    }

    /// Shared lookup first; on any miss fall back to the named factory.
    pub fn resolve(
        &self,
        name: &str,
        tenant: &TenantId,
        props: &DatabaseProperties,
    ) -> Result<Arc<dyn CredentialsProvider>, CredentialsError> {
        match self.shared_instance(name) {
            Ok(provider) => return Ok(provider),
            Err(reason) => tracing::debug!(tenant_id = %tenant, "no shared credentials provider '{}': {}", name, reason),
        }
        let factory = self
            .factories
            .read()
            .ok()
            .and_then(|f| f.get(name).cloned())
            .ok_or_else(|| CredentialsError::Load {
                name: name.to_string(),
                source: "no shared instance or factory registered under this name".into(),
            })?;
        factory(tenant, props).map_err(|source| CredentialsError::Load {
            name: name.to_string(),
            source,
        })
    }

    fn shared_instance(&self, name: &str) -> Result<Arc<dyn CredentialsProvider>, String> {
        let shared = self.shared.read().map_err(|_| "shared provider table poisoned".to_string())?;
        shared.get(name).cloned().ok_or_else(|| "not registered".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> DatabaseProperties {
        DatabaseProperties::new("postgres://db/t1", "cfg-user", "cfg-pw")
    }

    fn tenant() -> TenantId {
        TenantId::parse("t1").unwrap()
    }

    #[test]
    fn shared_instance_wins_over_factory() {
        let resolver = CredentialsProviderResolver::with_builtin();
        let shared: Arc<dyn CredentialsProvider> = Arc::new(PropertiesCredentialsProvider::new("shared", "pw"));
        resolver.register_shared(DEFAULT_CREDENTIALS_PROVIDER, shared.clone());
        let got = resolver.resolve(DEFAULT_CREDENTIALS_PROVIDER, &tenant(), &props()).unwrap();
        assert!(Arc::ptr_eq(&got, &shared));
    }

    #[test]
    fn factory_builds_per_tenant_instances() {
        let resolver = CredentialsProviderResolver::with_builtin();
        let a = resolver.resolve(DEFAULT_CREDENTIALS_PROVIDER, &tenant(), &props()).unwrap();
        let b = resolver.resolve(DEFAULT_CREDENTIALS_PROVIDER, &tenant(), &props()).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.user_name(), "cfg-user");
    }

    #[test]
    fn unknown_name_is_a_load_fault() {
        let resolver = CredentialsProviderResolver::empty();
        let err = match resolver.resolve("com.example.Vault", &tenant(), &props()) {
            Err(e) => e,
            Ok(_) => panic!("expected load failure"),
        };
        assert!(err.to_string().contains("com.example.Vault"));
    }

    #[test]
    fn factory_failure_is_wrapped() {
        let resolver = CredentialsProviderResolver::empty();
        resolver.register_factory("broken", |_, _| Err("vault unreachable".into()));
        let err = match resolver.resolve("broken", &tenant(), &props()) {
            Err(e) => e,
            Ok(_) => panic!("expected load failure"),
        };
        let msg = err.to_string();
        assert!(msg.contains("broken"));
        assert!(msg.contains("vault unreachable"));
    }
}
