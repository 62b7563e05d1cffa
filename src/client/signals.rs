use crate::cache::{ApiCacheStats, ApiSavings, CacheStats};
use crate::resilience::{CircuitBreakerSnapshot, RateLimiterSnapshot};
use crate::types::ApiType;
use serde::Serialize;

/// Point-in-time view of one api type's guards. Facts only; building it never
/// changes breaker or limiter state.
#[derive(Debug, Clone, Serialize)]
pub struct ApiStatus {
    pub api_type: ApiType,
    /// `None` until the first call creates the breaker.
    pub circuit_breaker: Option<CircuitBreakerSnapshot>,
    /// One entry per active rate-limit key (tier and subject).
    pub rate_limits: Vec<RateLimiterSnapshot>,
    pub cache: ApiCacheStats,
    pub savings: ApiSavings,
}

/// Aggregate cache view for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub backend: &'static str,
    pub entries: usize,
    pub hit_ratio: f64,
    pub stats: CacheStats,
    pub savings: Vec<ApiSavings>,
    pub total_calls_saved: u64,
    pub total_cost_saved_micros: u64,
    pub total_cost_saved_usd: f64,
}
