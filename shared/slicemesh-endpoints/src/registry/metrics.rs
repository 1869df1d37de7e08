//! Not-ready endpoint counters

use dashmap::DashMap;
use slicemesh_telemetry::Counter;

use crate::source::MetricsSink;

pub struct CounterMetricsSink {
    total: Counter,
    per_proxy: DashMap<String, Counter>,
}

impl CounterMetricsSink {
    pub fn new() -> Self {
        Self {
            total: Counter::new("proxy_status_endpoint_not_ready"),
            per_proxy: DashMap::new(),
        }
    }

    pub fn not_ready_total(&self) -> u64 {
        self.total.get()
    }

    pub fn not_ready_for(&self, proxy_id: &str) -> u64 {
        self.per_proxy.get(proxy_id).map(|c| c.get()).unwrap_or(0)
    }
}

impl Default for CounterMetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for CounterMetricsSink {
    fn endpoint_not_ready(&self, proxy_id: &str) {
        self.total.inc();
        self.per_proxy
            .entry(proxy_id.to_string())
            .or_insert_with(|| Counter::new("proxy_status_endpoint_not_ready"))
            .inc();
    }
}
