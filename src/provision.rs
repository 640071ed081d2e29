//! Create tenant databases that do not exist yet. Used at startup when `AUTO_CREATE_DATABASES` is set.

use crate::config::{DataSourcesConfig, DatabaseProperties};
use crate::credentials::CredentialsProviderResolver;
use crate::error::DataSourceError;
use crate::pool::postgres::connect_options;
use crate::tenant::TenantId;
use sqlx::ConnectOptions;

const MAINTENANCE_DATABASE: &str = "postgres";

/// Ensure the database named in the tenant's url exists; create it if not. Connects to the
/// `postgres` maintenance database with the tenant's credentials to run CREATE DATABASE.
pub async fn ensure_database_exists(tenant: &TenantId, props: &DatabaseProperties) -> Result<(), DataSourceError> {
    let options = connect_options(tenant, props)?;
    let db_name = match options.get_database() {
        Some(name) if !name.is_empty() && name != MAINTENANCE_DATABASE => name.to_string(),
        _ => return Ok(()),
    };
    let mut conn = options.database(MAINTENANCE_DATABASE).connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
        tracing::info!(tenant_id = %tenant, database = %db_name, "created database");
    }
    Ok(())
}

/// `props` with the username and password of the tenant's named credentials provider, the same
/// override pool initialization applies.
pub fn with_provider_credentials(
    tenant: &TenantId,
    props: &DatabaseProperties,
    resolver: &CredentialsProviderResolver,
) -> Result<DatabaseProperties, DataSourceError> {
    let mut props = props.clone();
    if let Some(name) = props.credentials_provider_name() {
        let provider = resolver.resolve(name, tenant, &props)?;
        props.user_name = provider.user_name();
        props.password = provider.password();
    }
    Ok(props)
}

/// Every configured database for the active mode. Failures are logged per tenant, not returned;
/// pool initialization reports them again.
pub async fn ensure_databases(config: &DataSourcesConfig, resolver: &CredentialsProviderResolver) {
    let targets: Vec<(TenantId, &DatabaseProperties)> = if config.multitenancy_enabled {
        config.tenants.iter().map(|(id, p)| (id.clone(), p)).collect()
    } else {
        config.default.iter().map(|p| (TenantId::default_tenant(), p)).collect()
    };
    for (tenant, props) in targets {
        let created = match with_provider_credentials(&tenant, props, resolver) {
            Ok(props) => ensure_database_exists(&tenant, &props).await,
            Err(e) => Err(e),
        };
        if let Err(e) = created {
            tracing::warn!(tenant_id = %tenant, "could not ensure database exists: {}", e);
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::ENV_CREDENTIALS_PROVIDER;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("tenant_a"), "\"tenant_a\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn named_provider_supplies_credentials() {
        let tenant = TenantId::parse("provision-env-test").unwrap();
        std::env::set_var("PROVISION_ENV_TEST_DB_USERNAME", "env-user");
        std::env::set_var("PROVISION_ENV_TEST_DB_PASSWORD", "env-pw");
        let props = DatabaseProperties::new("postgres://localhost/t1", "cfg-user", "cfg-pw")
            .with_credentials_provider(Some(ENV_CREDENTIALS_PROVIDER));
        let resolved = with_provider_credentials(&tenant, &props, &CredentialsProviderResolver::with_builtin()).unwrap();
        assert_eq!(resolved.user_name, "env-user");
        assert_eq!(resolved.password, "env-pw");
        assert_eq!(props.user_name, "cfg-user");
    }

    #[test]
    fn unknown_provider_is_an_error() {
        let props = DatabaseProperties::new("postgres://localhost/t1", "u", "p").with_credentials_provider(Some("vault"));
        let res = with_provider_credentials(&TenantId::default_tenant(), &props, &CredentialsProviderResolver::with_builtin());
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn maintenance_database_is_left_alone() {
        let props = DatabaseProperties::new("postgres://127.0.0.1:1/postgres", "u", "p");
        ensure_database_exists(&TenantId::default_tenant(), &props).await.unwrap();
    }
}
