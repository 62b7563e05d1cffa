//! Per-entry access history used for adaptive TTLs and warm-up selection.

use crate::types::ApiType;
use crate::utils::instant_after;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Linear-interpolated percentile over an ascending slice. `p` is in `[0, 1]`.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = p.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// An entry that is popular and about to expire.
#[derive(Debug, Clone, Serialize)]
pub struct WarmCandidate {
    pub api_type: ApiType,
    pub storage_key: String,
    /// Normalized request parameters, enough to replay the call.
    pub params: Value,
    pub access_count: u64,
    pub expires_in_secs: u64,
}

struct Tracked {
    api_type: ApiType,
    params: Value,
    accesses: VecDeque<Instant>,
    access_count: u64,
    expires_at: Instant,
}

pub(crate) struct AccessTracker {
    retention: Duration,
    max_samples: usize,
    entries: Mutex<HashMap<String, Tracked>>,
}

impl AccessTracker {
    pub(crate) fn new(retention: Duration, max_samples: usize) -> Self {
        Self {
            retention,
            max_samples: max_samples.max(2),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records a write. History survives re-writes; the lifetime access count
    /// is returned for persisting alongside the payload.
    pub(crate) fn record_set(
        &self,
        key: &str,
        api_type: ApiType,
        params: Value,
        ttl: Duration,
        now: Instant,
    ) -> u64 {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut entries, now);
        let t = entries.entry(key.to_string()).or_insert_with(|| Tracked {
            api_type,
            params: Value::Null,
            accesses: VecDeque::new(),
            access_count: 0,
            expires_at: now,
        });
        t.params = params;
        t.expires_at = instant_after(now, ttl);
        t.access_count
    }

    pub(crate) fn record_hit(&self, key: &str, now: Instant) -> u64 {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(t) = entries.get_mut(key) else {
            return 0;
        };
        t.accesses.push_back(now);
        while t.accesses.len() > self.max_samples {
            t.accesses.pop_front();
        }
        while let Some(front) = t.accesses.front() {
            if now.duration_since(*front) > self.retention {
                t.accesses.pop_front();
            } else {
                break;
            }
        }
        t.access_count += 1;
        t.access_count
    }

    pub(crate) fn access_count(&self, key: &str) -> u64 {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).map(|t| t.access_count).unwrap_or(0)
    }

    /// P90 of the gaps between recorded accesses, clamped to `[min, max]`.
    /// Needs at least two accesses.
    pub(crate) fn adaptive_ttl(&self, key: &str, min: Duration, max: Duration) -> Option<Duration> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let t = entries.get(key)?;
        if t.accesses.len() < 2 {
            return None;
        }
        let mut gaps: Vec<f64> = t
            .accesses
            .iter()
            .zip(t.accesses.iter().skip(1))
            .map(|(a, b)| b.duration_since(*a).as_secs_f64())
            .collect();
        gaps.sort_by(|a, b| a.total_cmp(b));
        let p90 = percentile(&gaps, 0.9)?;
        let secs = p90.clamp(min.as_secs_f64(), max.as_secs_f64().max(min.as_secs_f64()));
        Some(Duration::from_secs_f64(secs))
    }

    pub(crate) fn candidates(
        &self,
        threshold: u64,
        refresh_window: Duration,
        limit: usize,
        now: Instant,
    ) -> Vec<WarmCandidate> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut entries, now);
        let mut out: Vec<WarmCandidate> = entries
            .iter()
            .filter(|(_, t)| t.access_count >= threshold && t.expires_at > now)
            .filter_map(|(k, t)| {
                let left = t.expires_at.duration_since(now);
                (left <= refresh_window).then(|| WarmCandidate {
                    api_type: t.api_type,
                    storage_key: k.clone(),
                    params: t.params.clone(),
                    access_count: t.access_count,
                    expires_in_secs: left.as_secs(),
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.access_count
                .cmp(&a.access_count)
                .then_with(|| a.expires_in_secs.cmp(&b.expires_in_secs))
        });
        out.truncate(limit);
        out
    }

    pub(crate) fn forget(&self, key: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    pub(crate) fn clear(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drops entries that expired and saw no access within the retention window.
    fn prune(&self, entries: &mut HashMap<String, Tracked>, now: Instant) {
        let retention = self.retention;
        entries.retain(|_, t| {
            let last = t.accesses.back().copied().unwrap_or(t.expires_at).max(t.expires_at);
            now.duration_since(last) <= retention
        });
    }
}
