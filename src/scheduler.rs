//! Periodic credential refresh. Fixed delay: the next wait starts after the previous sweep ends.

use crate::pool::PoolFactory;
use crate::registry::TenantRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct CredentialRefreshScheduler<F: PoolFactory> {
    registry: Arc<TenantRegistry<F>>,
    interval: Duration,
}

impl<F: PoolFactory> CredentialRefreshScheduler<F> {
    pub fn new(registry: Arc<TenantRegistry<F>>, interval: Duration) -> Self {
        CredentialRefreshScheduler { registry, interval }
    }

    pub fn spawn(self) -> RefreshHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;
        let registry = self.registry;
        tracing::info!(interval_ms = interval.as_millis() as u64, "credential refresh scheduler started");
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                        continue;
                    }
                }
                if let Some(summary) = registry.refresh_credentials().await {
                    if !summary.failed.is_empty() {
                        tracing::warn!(failed = summary.failed.len(), "some tenants failed credential refresh");
                    }
                }
            }
            tracing::info!("credential refresh scheduler stopped");
        });
        RefreshHandle { shutdown_tx, task }
    }
}

/// Stops the scheduler task.
pub struct RefreshHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Signal the loop and wait for it to exit. A sweep already running finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("credential refresh scheduler ended abnormally: {}", e);
        }
    }
}
