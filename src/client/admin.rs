//! Administrative operations. Every result is `Serialize` so a dashboard can
//! hand it straight to a JSON encoder.

use crate::cache::CostReport;
use crate::types::api_type::micros_to_usd;
use crate::types::ApiType;
use crate::Result;
use std::time::Duration;
use tracing::info;

use super::core::ApiGuard;
use super::signals::{ApiStatus, CacheReport};

impl ApiGuard {
    pub async fn get_status(&self, api_type: ApiType) -> ApiStatus {
        let stats = self.cache.stats();
        ApiStatus {
            api_type,
            circuit_breaker: self.breakers.snapshot(api_type),
            rate_limits: self.limiter.snapshots_for(api_type).await,
            cache: stats.per_api.get(&api_type).cloned().unwrap_or_default(),
            savings: self.cache.savings(api_type),
        }
    }

    /// Returns `false` when no breaker exists yet for `api_type`.
    pub fn reset_circuit(&self, api_type: ApiType) -> bool {
        let reset = self.breakers.reset(api_type);
        if reset {
            info!(api_type = %api_type, "Circuit breaker reset by operator");
        }
        reset
    }

    pub fn reset_all_circuits(&self) -> usize {
        let n = self.breakers.reset_all();
        info!(count = n, "All circuit breakers reset by operator");
        n
    }

    /// Drops every entry of `api_type`, or only those whose fingerprint hash
    /// matches `pattern` (a `*`/`?` glob). Returns how many were removed.
    pub async fn invalidate_cache(&self, api_type: ApiType, pattern: Option<&str>) -> Result<u64> {
        let removed = match pattern {
            None => self.cache.invalidate(api_type, None).await?,
            Some(p) => {
                self.cache
                    .invalidate_pattern(&format!("{}:{}", api_type.as_str(), p))
                    .await?
            }
        };
        info!(api_type = %api_type, pattern = ?pattern, removed, "Cache invalidated");
        Ok(removed)
    }

    pub async fn clear_all_cache(&self) -> Result<u64> {
        let removed = self.cache.clear().await?;
        info!(removed, "Cache cleared");
        Ok(removed)
    }

    pub async fn get_cache_stats(&self) -> Result<CacheReport> {
        let stats = self.cache.stats();
        let savings = self.cache.savings_all();
        let total_calls_saved = savings.iter().map(|s| s.api_calls_saved).sum();
        let total_cost_saved_micros: u64 = savings.iter().map(|s| s.cost_saved_micros).sum();
        Ok(CacheReport {
            backend: self.cache.backend_name(),
            entries: self.cache.entry_count().await?,
            hit_ratio: stats.hit_ratio(),
            stats,
            savings,
            total_calls_saved,
            total_cost_saved_micros,
            total_cost_saved_usd: micros_to_usd(total_cost_saved_micros),
        })
    }

    /// Savings from cache hits within the trailing `period`.
    pub fn get_cost_report(&self, period: Duration) -> CostReport {
        self.cache.cost_report(period)
    }
}
