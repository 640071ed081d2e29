//! Named gauges attached per pool. Exporting them is left to the caller.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

pub const TOTAL_CONNECTIONS: &str = "pool.TotalConnections";
pub const ACTIVE_CONNECTIONS: &str = "pool.ActiveConnections";
pub const IDLE_CONNECTIONS: &str = "pool.IdleConnections";
pub const PENDING_CONNECTIONS: &str = "pool.PendingConnections";

pub type Gauge = Arc<dyn Fn() -> f64 + Send + Sync>;

struct Registered {
    owner: Uuid,
    gauge: Gauge,
}

/// Gauges keyed by name, with the same ownership rule as [`super::HealthCheckRegistry`].
#[derive(Default)]
pub struct MetricRegistry {
    gauges: RwLock<BTreeMap<String, Registered>>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_gauge(&self, name: impl Into<String>, owner: Uuid, gauge: Gauge) {
        if let Ok(mut gauges) = self.gauges.write() {
            gauges.insert(name.into(), Registered { owner, gauge });
        }
    }

    pub fn unregister_owned(&self, owner: Uuid) {
        if let Ok(mut gauges) = self.gauges.write() {
            gauges.retain(|_, r| r.owner != owner);
        }
    }

    pub fn gauge(&self, name: &str) -> Option<f64> {
        let gauge = self.gauges.read().ok()?.get(name).map(|r| Arc::clone(&r.gauge))?;
        Some(gauge())
    }

    /// Current value of every gauge, sorted by name.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        let gauges: Vec<(String, Gauge)> = match self.gauges.read() {
            Ok(g) => g.iter().map(|(n, r)| (n.clone(), Arc::clone(&r.gauge))).collect(),
            Err(_) => Vec::new(),
        };
        gauges.into_iter().map(|(name, gauge)| (name, gauge())).collect()
    }
}
