//! Lightweight counters and gauges for scan/exit observability.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared metrics collector for the discovery and tracking loops.
#[derive(Clone, Default)]
pub struct EngineMetrics {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    counters: HashMap<String, u64>,
    gauges: HashMap<String, f64>,
}

/// Point-in-time copy of all recorded metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub gauges: HashMap<String, f64>,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn increment_counter(&self, name: &str) {
        self.add_to_counter(name, 1).await;
    }

    pub async fn add_to_counter(&self, name: &str, amount: u64) {
        let mut inner = self.inner.write().await;
        *inner.counters.entry(name.to_string()).or_insert(0) += amount;
    }

    pub async fn set_gauge(&self, name: &str, value: f64) {
        let mut inner = self.inner.write().await;
        inner.gauges.insert(name.to_string(), value);
    }

    pub async fn counter(&self, name: &str) -> u64 {
        self.inner.read().await.counters.get(name).copied().unwrap_or(0)
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read().await;
        MetricsSnapshot {
            counters: inner.counters.clone(),
            gauges: inner.gauges.clone(),
        }
    }
}
