//! Runs only when `TEST_PG_URL` (server url without database, e.g. `postgres://localhost:5432`),
//! `TEST_PG_USER` and `TEST_PG_PASSWORD` are set.

use std::sync::Arc;
use tenant_datasource::{
    ensure_database_exists, DatabaseProperties, HealthCheckRegistry, MetricRegistry, PgPoolFactory, TenantContext,
    TenantId, TenantRegistry,
};

fn pg_env() -> Option<(String, String, String)> {
    let url = std::env::var("TEST_PG_URL").ok()?;
    let user = std::env::var("TEST_PG_USER").ok()?;
    let password = std::env::var("TEST_PG_PASSWORD").ok()?;
    Some((url.trim_end_matches('/').to_string(), user, password))
}

#[tokio::test]
async fn rows_stay_in_their_tenant_database() {
    let Some((base, user, password)) = pg_env() else {
        eprintln!("TEST_PG_URL/TEST_PG_USER/TEST_PG_PASSWORD not set; skipping");
        return;
    };

    let health = Arc::new(HealthCheckRegistry::new());
    let metrics = Arc::new(MetricRegistry::new());
    let factory = PgPoolFactory::new(Arc::clone(&health), Arc::clone(&metrics));
    let registry = TenantRegistry::new(factory, TenantContext::new(true)).with_instrumentation(health, metrics);

    for (id, row) in [("t1", "A"), ("t2", "B")] {
        let tenant = TenantId::parse(id).unwrap();
        let props = DatabaseProperties::new(format!("{}/tenant_ds_{}", base, id), user.as_str(), password.as_str())
            .with_pool_name(format!("{}Pool", id));
        ensure_database_exists(&tenant, &props).await.unwrap();
        assert!(registry.add_or_update(id, Some(props)).await.unwrap());

        let pool = registry.pool(id).unwrap();
        sqlx::query("DROP TABLE IF EXISTS items").execute(pool.inner()).await.unwrap();
        sqlx::query("CREATE TABLE items (name TEXT NOT NULL)").execute(pool.inner()).await.unwrap();
        sqlx::query("INSERT INTO items (name) VALUES ($1)").bind(row).execute(pool.inner()).await.unwrap();
    }

    let router = registry.router();
    let ctx = registry.context();
    for (id, expected) in [("t1", "A"), ("t2", "B")] {
        let rows: Vec<String> = ctx
            .with_tenant(Some(id), async {
                let mut conn = router.get_connection().await.unwrap();
                sqlx::query_scalar("SELECT name FROM items").fetch_all(&mut *conn).await.unwrap()
            })
            .await
            .unwrap();
        assert_eq!(rows, vec![expected.to_string()]);
    }

    let gauges = registry.metrics().snapshot();
    assert!(gauges.contains_key("t1.t1Pool.pool.TotalConnections"));
    assert!(registry.check_health().await.healthy);

    registry.close_all().await;
    assert!(registry.metrics().snapshot().is_empty());
}

#[tokio::test]
async fn default_pool_names_do_not_collide_across_tenants() {
    let Some((base, user, password)) = pg_env() else {
        eprintln!("TEST_PG_URL/TEST_PG_USER/TEST_PG_PASSWORD not set; skipping");
        return;
    };

    let health = Arc::new(HealthCheckRegistry::new());
    let metrics = Arc::new(MetricRegistry::new());
    let factory = PgPoolFactory::new(Arc::clone(&health), Arc::clone(&metrics));
    let registry = TenantRegistry::new(factory, TenantContext::new(true)).with_instrumentation(health, metrics);

    for id in ["t1", "t2"] {
        let tenant = TenantId::parse(id).unwrap();
        let mut props = DatabaseProperties::new(format!("{}/tenant_ds_names_{}", base, id), user.as_str(), password.as_str());
        props.data_source_retry_count = 0;
        props.connection_retry_count = 0;
        ensure_database_exists(&tenant, &props).await.unwrap();
        assert!(registry.add_or_update(id, Some(props)).await.unwrap());
    }
    let t1_checks = vec![
        "t1.defaultPool.pool.Connection99Percent".to_string(),
        "t1.defaultPool.pool.ConnectivityCheck".to_string(),
    ];

    registry.remove("t2").await.unwrap();
    assert_eq!(registry.health_checks().names(), t1_checks);
    assert!(registry.metrics().snapshot().contains_key("t1.defaultPool.pool.IdleConnections"));

    let mut broken = registry.properties("t1").unwrap();
    broken.password = format!("{}-wrong", password);
    broken.data_source_retry_delay_ms = 1;
    assert!(registry.add_or_update("t1", Some(broken)).await.is_err());
    assert_eq!(registry.health_checks().names(), t1_checks);
    assert!(registry.check_health().await.healthy);

    registry.close_all().await;
}
