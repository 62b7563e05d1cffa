//! Shared fixtures for integration tests.
#![allow(dead_code)]

use meterguard::config::GuardConfig;
use meterguard::resilience::{RateLimitRule, RetryConfig};
use meterguard::telemetry::InMemoryMetricsSink;
use meterguard::types::{ApiType, CallFailure, RawResponse};
use meterguard::ApiGuard;
use serde_json::json;
use std::collections::VecDeque;
use std::future::Ready;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Outcome = Result<RawResponse, CallFailure>;

/// Scripted underlying call. Replays `outcomes` in order, then answers 200.
pub struct Script {
    outcomes: Mutex<VecDeque<Outcome>>,
    calls: AtomicU32,
}

impl Script {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            calls: AtomicU32::new(0),
        }
    }

    pub fn statuses(statuses: &[u16]) -> Self {
        Self::new(
            statuses
                .iter()
                .map(|s| Ok(RawResponse::new(*s, json!({"status": s}))))
                .collect(),
        )
    }

    pub fn next(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RawResponse::ok(json!({"results": ["ok"]}))))
    }

    /// Closure body for `ApiGuard::execute`.
    pub fn call(&self) -> Ready<Outcome> {
        std::future::ready(self.next())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Deterministic delays and a generous default limit.
pub fn quiet_config() -> GuardConfig {
    let mut config = GuardConfig::default();
    config.retry = RetryConfig::new().without_jitter();
    config.rate_limits.default_rule = RateLimitRule::sliding_window(1_000, Duration::from_secs(60));
    config
}

pub fn guard(config: GuardConfig) -> (ApiGuard, Arc<InMemoryMetricsSink>) {
    let metrics = Arc::new(InMemoryMetricsSink::new());
    let guard = ApiGuard::builder()
        .config(config)
        .metrics_sink(metrics.clone())
        .build()
        .expect("valid test config");
    (guard, metrics)
}

pub fn outcome_count(metrics: &InMemoryMetricsSink, api_type: ApiType, outcome: &str) -> u64 {
    metrics.counter(
        meterguard::telemetry::names::CALLS_TOTAL,
        &[("api_type", api_type.as_str()), ("outcome", outcome)],
    )
}
