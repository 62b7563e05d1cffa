//! 指标模块：向外部仪表盘输出计数器与仪表值。
//!
//! # Metrics Sink Module
//!
//! The guard reports counters and gauges through the [`MetricsSink`] trait. The
//! sink is an external collaborator: applications plug in their own exporter,
//! the guard never assumes one is installed.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`MetricsSink`] | Trait for metric destinations |
//! | [`NoopMetricsSink`] | Default sink, discards everything |
//! | [`TracingMetricsSink`] | Emits each metric as a `tracing` debug event |
//! | [`InMemoryMetricsSink`] | Aggregates in memory, for tests and dashboards |
//! | [`names`] | Metric name constants |

pub mod names;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Label set attached to a metric sample.
pub type Labels<'a> = &'a [(&'static str, &'a str)];

pub trait MetricsSink: Send + Sync {
    fn increment_counter(&self, name: &'static str, value: u64, labels: Labels<'_>);
    fn set_gauge(&self, name: &'static str, value: f64, labels: Labels<'_>);
}

pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn increment_counter(&self, _: &'static str, _: u64, _: Labels<'_>) {}
    fn set_gauge(&self, _: &'static str, _: f64, _: Labels<'_>) {}
}

pub fn noop_sink() -> Arc<dyn MetricsSink> {
    Arc::new(NoopMetricsSink)
}

/// Debug sink that forwards metrics to the `tracing` subscriber.
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn increment_counter(&self, name: &'static str, value: u64, labels: Labels<'_>) {
        tracing::debug!(metric = name, value, labels = %render_labels(labels), "counter");
    }

    fn set_gauge(&self, name: &'static str, value: f64, labels: Labels<'_>) {
        tracing::debug!(metric = name, value, labels = %render_labels(labels), "gauge");
    }
}

/// In-memory sink. Series are keyed by name plus sorted labels.
#[derive(Default)]
pub struct InMemoryMetricsSink {
    counters: RwLock<HashMap<String, u64>>,
    gauges: RwLock<HashMap<String, f64>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str, labels: Labels<'_>) -> u64 {
        let key = series_key(name, labels);
        self.counters
            .read()
            .ok()
            .and_then(|c| c.get(&key).copied())
            .unwrap_or(0)
    }

    /// Sum of a counter across every label set.
    pub fn counter_total(&self, name: &str) -> u64 {
        let Ok(counters) = self.counters.read() else {
            return 0;
        };
        counters
            .iter()
            .filter(|(k, _)| series_name(k) == name)
            .map(|(_, v)| *v)
            .sum()
    }

    pub fn gauge(&self, name: &str, labels: Labels<'_>) -> Option<f64> {
        let key = series_key(name, labels);
        self.gauges.read().ok().and_then(|g| g.get(&key).copied())
    }

    pub fn clear(&self) {
        if let Ok(mut c) = self.counters.write() {
            c.clear();
        }
        if let Ok(mut g) = self.gauges.write() {
            g.clear();
        }
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn increment_counter(&self, name: &'static str, value: u64, labels: Labels<'_>) {
        if let Ok(mut counters) = self.counters.write() {
            *counters.entry(series_key(name, labels)).or_insert(0) += value;
        }
    }

    fn set_gauge(&self, name: &'static str, value: f64, labels: Labels<'_>) {
        if let Ok(mut gauges) = self.gauges.write() {
            gauges.insert(series_key(name, labels), value);
        }
    }
}

fn render_labels(labels: Labels<'_>) -> String {
    let sorted: BTreeMap<_, _> = labels.iter().copied().collect();
    sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

fn series_key(name: &str, labels: Labels<'_>) -> String {
    format!("{}{{{}}}", name, render_labels(labels))
}

fn series_name(key: &str) -> &str {
    key.split('{').next().unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_aggregates_by_series() {
        let sink = InMemoryMetricsSink::new();
        sink.increment_counter(names::CACHE_HITS_TOTAL, 1, &[("api_type", "geocoding")]);
        sink.increment_counter(names::CACHE_HITS_TOTAL, 2, &[("api_type", "geocoding")]);
        sink.increment_counter(names::CACHE_HITS_TOTAL, 5, &[("api_type", "routes")]);

        assert_eq!(sink.counter(names::CACHE_HITS_TOTAL, &[("api_type", "geocoding")]), 3);
        assert_eq!(sink.counter_total(names::CACHE_HITS_TOTAL), 8);
        assert_eq!(sink.counter(names::CACHE_MISSES_TOTAL, &[]), 0);
    }

    #[test]
    fn label_order_does_not_matter() {
        let sink = InMemoryMetricsSink::new();
        sink.set_gauge(names::CIRCUIT_STATE, 2.0, &[("a", "1"), ("b", "2")]);
        assert_eq!(sink.gauge(names::CIRCUIT_STATE, &[("b", "2"), ("a", "1")]), Some(2.0));
    }
}
