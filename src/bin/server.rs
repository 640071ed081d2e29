//! Tenant datasource server: loads `datasources.json`, builds every tenant pool, serves the
//! admin and tenant-routed API, and rotates credentials on a schedule.
//!
//! Environment: `DATASOURCES_CONFIG` (default `datasources.json`), `BIND_ADDR` (default
//! `0.0.0.0:3000`), `AUTO_CREATE_DATABASES`, plus the config overrides `MULTITENANCY_ENABLED`
//! and `CREDENTIALS_REFRESH_CHECK_INTERVAL_MS`.

use std::sync::Arc;
use tenant_datasource::{
    app, datasource_routes, ensure_databases, load_from_path, AppState, CredentialRefreshScheduler,
    CredentialsProviderResolver, HealthCheckRegistry, MetricRegistry, PgPoolFactory, TenantContext, TenantRegistry,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tenant_datasource=info")),
        )
        .init();

    let config_path = std::env::var("DATASOURCES_CONFIG").unwrap_or_else(|_| "datasources.json".into());
    let config = load_from_path(&config_path).await?;

    let auto_create = std::env::var("AUTO_CREATE_DATABASES")
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
        .unwrap_or(false);
    let resolver = Arc::new(CredentialsProviderResolver::with_builtin());
    if auto_create {
        ensure_databases(&config, &resolver).await;
    }

    let health = Arc::new(HealthCheckRegistry::new());
    let metrics = Arc::new(MetricRegistry::new());
    let factory = PgPoolFactory::new(Arc::clone(&health), Arc::clone(&metrics));
    let registry = Arc::new(
        TenantRegistry::new(factory, TenantContext::new(config.multitenancy_enabled))
            .with_resolver(resolver)
            .with_instrumentation(health, metrics),
    );
    let report = registry.initialize(&config).await?;
    for (tenant, reason) in &report.failed {
        tracing::warn!(tenant_id = %tenant, "tenant has no datasource until re-added: {}", reason);
    }

    let scheduler = CredentialRefreshScheduler::new(Arc::clone(&registry), config.refresh_check_interval()).spawn();

    let state = AppState::new(Arc::clone(&registry));
    let router = app(state.clone()).merge(datasource_routes(state));

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("tenant datasource server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    scheduler.shutdown().await;
    registry.close_all().await;
    Ok(())
}
