//! Named health checks attached per pool, plus the acquisition-latency window behind the p99 check.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

/// Suffix of the connectivity check name (`{tenantId}.{poolName}.pool.ConnectivityCheck`).
pub const CONNECTIVITY_CHECK: &str = "pool.ConnectivityCheck";
/// Suffix of the p99 latency check name (`{tenantId}.{poolName}.pool.Connection99Percent`).
pub const LATENCY_P99_CHECK: &str = "pool.Connection99Percent";

const LATENCY_WINDOW: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        HealthStatus {
            healthy: true,
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        HealthStatus {
            healthy: false,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self) -> HealthStatus;
}

struct Registered {
    owner: Uuid,
    check: Arc<dyn HealthCheck>,
}

/// Health checks keyed by name. Each entry remembers the pool instance that registered it so a
/// closing pool never removes checks belonging to the pool that replaced it under the same name.
#[derive(Default)]
pub struct HealthCheckRegistry {
    checks: RwLock<BTreeMap<String, Registered>>,
}

impl HealthCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, owner: Uuid, check: Arc<dyn HealthCheck>) {
        if let Ok(mut checks) = self.checks.write() {
            checks.insert(name.into(), Registered { owner, check });
        }
    }

    /// Remove every check registered by `owner`.
    pub fn unregister_owned(&self, owner: Uuid) {
        if let Ok(mut checks) = self.checks.write() {
            checks.retain(|_, r| r.owner != owner);
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.checks
            .read()
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn run(&self, name: &str) -> Option<HealthStatus> {
        let check = self.checks.read().ok()?.get(name).map(|r| Arc::clone(&r.check))?;
        Some(check.check().await)
    }

    /// Run every check. Checks run outside the registry lock.
    pub async fn run_all(&self) -> BTreeMap<String, HealthStatus> {
        let checks: Vec<(String, Arc<dyn HealthCheck>)> = match self.checks.read() {
            Ok(c) => c.iter().map(|(n, r)| (n.clone(), Arc::clone(&r.check))).collect(),
            Err(_) => Vec::new(),
        };
        let mut results = BTreeMap::new();
        for (name, check) in checks {
            let status = check.check().await;
            if !status.healthy {
                tracing::warn!(check = %name, message = ?status.message, "health check failed");
            }
            results.insert(name, status);
        }
        results
    }
}

/// Sliding window of recent connection-acquisition latencies.
pub struct LatencyRecorder {
    samples: Mutex<VecDeque<Duration>>,
    capacity: usize,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::with_capacity(LATENCY_WINDOW)
    }
}

impl LatencyRecorder {
    pub fn with_capacity(capacity: usize) -> Self {
        LatencyRecorder {
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, latency: Duration) {
        if let Ok(mut samples) = self.samples.lock() {
            if samples.len() == self.capacity {
                samples.pop_front();
            }
            samples.push_back(latency);
        }
    }

    /// 99th percentile (nearest-rank) of the window; `None` before the first sample.
    pub fn p99(&self) -> Option<Duration> {
        let mut sorted: Vec<Duration> = self.samples.lock().ok()?.iter().copied().collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_unstable();
        let rank = (sorted.len() * 99).div_ceil(100);
        sorted.get(rank.saturating_sub(1)).copied()
    }
}

/// Healthy while the window's p99 stays within `expected`. An empty window is healthy.
pub struct LatencyP99Check {
    recorder: Arc<LatencyRecorder>,
    expected: Duration,
}

impl LatencyP99Check {
    pub fn new(recorder: Arc<LatencyRecorder>, expected: Duration) -> Self {
        LatencyP99Check { recorder, expected }
    }
}

#[async_trait]
impl HealthCheck for LatencyP99Check {
    async fn check(&self) -> HealthStatus {
        match self.recorder.p99() {
            Some(p99) if p99 > self.expected => HealthStatus::unhealthy(format!(
                "99% of connection acquisitions took up to {}ms, expected at most {}ms",
                p99.as_millis(),
                self.expected.as_millis()
            )),
            _ => HealthStatus::healthy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl HealthCheck for Fixed {
        async fn check(&self) -> HealthStatus {
            if self.0 {
                HealthStatus::healthy()
            } else {
                HealthStatus::unhealthy("down")
            }
        }
    }

    #[tokio::test]
    async fn unregister_only_removes_own_checks() {
        let registry = HealthCheckRegistry::new();
        let old_pool = Uuid::new_v4();
        let new_pool = Uuid::new_v4();
        registry.register("p.pool.ConnectivityCheck", old_pool, Arc::new(Fixed(true)));
        registry.register("p.pool.ConnectivityCheck", new_pool, Arc::new(Fixed(false)));
        registry.unregister_owned(old_pool);
        assert_eq!(registry.names(), vec!["p.pool.ConnectivityCheck".to_string()]);
        assert!(!registry.run("p.pool.ConnectivityCheck").await.unwrap().healthy);

        registry.unregister_owned(new_pool);
        assert!(registry.names().is_empty());
    }

    #[tokio::test]
    async fn run_all_reports_every_check() {
        let registry = HealthCheckRegistry::new();
        let owner = Uuid::new_v4();
        registry.register("a", owner, Arc::new(Fixed(true)));
        registry.register("b", owner, Arc::new(Fixed(false)));
        let results = registry.run_all().await;
        assert!(results["a"].healthy);
        assert_eq!(results["b"].message.as_deref(), Some("down"));
    }

    #[test]
    fn p99_is_nearest_rank() {
        let recorder = LatencyRecorder::with_capacity(200);
        assert_eq!(recorder.p99(), None);
        for ms in 1..=100 {
            recorder.record(Duration::from_millis(ms));
        }
        assert_eq!(recorder.p99(), Some(Duration::from_millis(99)));
    }

    #[test]
    fn window_drops_oldest_samples() {
        let recorder = LatencyRecorder::with_capacity(2);
        recorder.record(Duration::from_secs(10));
        recorder.record(Duration::from_millis(1));
        recorder.record(Duration::from_millis(2));
        assert_eq!(recorder.p99(), Some(Duration::from_millis(2)));
    }

    #[tokio::test]
    async fn p99_check_compares_against_expectation() {
        let recorder = Arc::new(LatencyRecorder::default());
        let check = LatencyP99Check::new(Arc::clone(&recorder), Duration::from_millis(50));
        assert!(check.check().await.healthy);
        recorder.record(Duration::from_millis(500));
        assert!(!check.check().await.healthy);
    }
}
