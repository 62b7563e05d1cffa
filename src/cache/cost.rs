//! Cost-savings accounting for cache hits.
//!
//! Savings are kept in integer micro-USD so `hits x cost_per_call` is exact.
//! A bounded ledger of hit timestamps backs period reports.

use crate::types::api_type::micros_to_usd;
use crate::types::ApiType;
use crate::utils::unix_millis;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Savings for one api type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ApiSavings {
    pub api_type: ApiType,
    pub cost_per_call_usd: f64,
    pub api_calls_saved: u64,
    pub cost_saved_micros: u64,
    pub cost_saved_usd: f64,
}

impl ApiSavings {
    fn new(api_type: ApiType, calls: u64) -> Self {
        let micros = calls.saturating_mul(api_type.cost_per_call_micros());
        Self {
            api_type,
            cost_per_call_usd: api_type.cost_per_call_usd(),
            api_calls_saved: calls,
            cost_saved_micros: micros,
            cost_saved_usd: micros_to_usd(micros),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostReport {
    pub period_secs: u64,
    pub generated_at_ms: u64,
    pub per_api: Vec<ApiSavings>,
    pub total_calls_saved: u64,
    pub total_cost_saved_micros: u64,
    pub total_cost_saved_usd: f64,
    /// `false` when the ledger dropped hits that may fall inside the period.
    pub complete: bool,
}

pub(crate) struct CostLedger {
    lifetime: BTreeMap<ApiType, AtomicU64>,
    hits: Mutex<VecDeque<(Instant, ApiType)>>,
    capacity: usize,
    dropped_before: Mutex<Option<Instant>>,
}

impl CostLedger {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lifetime: ApiType::ALL.iter().map(|a| (*a, AtomicU64::new(0))).collect(),
            hits: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            dropped_before: Mutex::new(None),
        }
    }

    /// Records one avoided call and returns the micro-USD it saved.
    pub(crate) fn record_hit(&self, api_type: ApiType, now: Instant) -> u64 {
        if let Some(calls) = self.lifetime.get(&api_type) {
            calls.fetch_add(1, Ordering::Relaxed);
        }
        let mut hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
        hits.push_back((now, api_type));
        while hits.len() > self.capacity {
            if let Some((t, _)) = hits.pop_front() {
                *self.dropped_before.lock().unwrap_or_else(PoisonError::into_inner) = Some(t);
            }
        }
        api_type.cost_per_call_micros()
    }

    pub(crate) fn lifetime(&self) -> Vec<ApiSavings> {
        self.lifetime
            .iter()
            .map(|(api, calls)| ApiSavings::new(*api, calls.load(Ordering::Relaxed)))
            .collect()
    }

    pub(crate) fn lifetime_for(&self, api_type: ApiType) -> ApiSavings {
        let calls = self
            .lifetime
            .get(&api_type)
            .map(|calls| calls.load(Ordering::Relaxed))
            .unwrap_or(0);
        ApiSavings::new(api_type, calls)
    }

    /// Hits within the trailing `period`, as of `now`.
    pub(crate) fn report(&self, period: Duration, now: Instant) -> CostReport {
        let mut calls: BTreeMap<ApiType, u64> = BTreeMap::new();
        {
            let hits = self.hits.lock().unwrap_or_else(PoisonError::into_inner);
            for (t, api) in hits.iter().rev() {
                if now.duration_since(*t) > period {
                    break;
                }
                *calls.entry(*api).or_default() += 1;
            }
        }
        let complete = match *self.dropped_before.lock().unwrap_or_else(PoisonError::into_inner) {
            Some(t) => now.duration_since(t) > period,
            None => true,
        };
        let per_api: Vec<ApiSavings> = ApiType::ALL
            .iter()
            .map(|a| ApiSavings::new(*a, calls.get(a).copied().unwrap_or(0)))
            .collect();
        let total_calls_saved = per_api.iter().map(|s| s.api_calls_saved).sum();
        let total_cost_saved_micros = per_api.iter().map(|s| s.cost_saved_micros).sum();
        CostReport {
            period_secs: period.as_secs(),
            generated_at_ms: unix_millis(),
            per_api,
            total_calls_saved,
            total_cost_saved_micros,
            total_cost_saved_usd: micros_to_usd(total_cost_saved_micros),
            complete,
        }
    }
}
