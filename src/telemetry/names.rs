//! Metric name constants.
//!
//! All metrics are prefixed with `meterguard_`. Counters end in `_total`.
//!
//! # Common labels
//!
//! - `api_type`: metered service (e.g. "geocoding", "routes")
//! - `kind`: [`crate::ErrorKind`] name for failures
//! - `outcome`: "ok", "error", "cached", "rejected", "cancelled"

/// Logical calls through the guard.
///
/// Labels: `api_type`, `outcome`.
pub const CALLS_TOTAL: &str = "meterguard_calls_total";

/// Retry attempts (not counting the first attempt).
///
/// Labels: `api_type`, `kind`.
pub const RETRIES_TOTAL: &str = "meterguard_retries_total";

/// Classified failures, one per failed attempt.
///
/// Labels: `api_type`, `kind`.
pub const ERRORS_TOTAL: &str = "meterguard_errors_total";

/// Circuit breaker state transitions.
///
/// Labels: `api_type`, `from`, `to`.
pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "meterguard_circuit_transitions_total";

/// Current breaker state: 0 = closed, 1 = half-open, 2 = open.
///
/// Labels: `api_type`.
pub const CIRCUIT_STATE: &str = "meterguard_circuit_state";

/// Calls rejected because the breaker was open.
///
/// Labels: `api_type`.
pub const CIRCUIT_REJECTIONS_TOTAL: &str = "meterguard_circuit_rejections_total";

/// Calls rejected by the rate limiter.
///
/// Labels: `api_type`, `tier`.
pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "meterguard_rate_limit_rejections_total";

/// Labels: `api_type`.
pub const CACHE_HITS_TOTAL: &str = "meterguard_cache_hits_total";

/// Labels: `api_type`.
pub const CACHE_MISSES_TOTAL: &str = "meterguard_cache_misses_total";

/// Labels: `api_type`.
pub const CACHE_SETS_TOTAL: &str = "meterguard_cache_sets_total";

/// Responses the cache refused to store.
///
/// Labels: `api_type`, `reason` ("error_response" | "oversized" | "disabled").
pub const CACHE_SET_REJECTED_TOTAL: &str = "meterguard_cache_set_rejected_total";

/// Cost avoided by cache hits, in micro-USD.
///
/// Labels: `api_type`.
pub const COST_SAVED_MICROS_TOTAL: &str = "meterguard_cost_saved_micros_total";

/// Entries flagged for prefetch by the warm-up task.
///
/// Labels: `api_type`.
pub const WARMUP_CANDIDATES_TOTAL: &str = "meterguard_warmup_candidates_total";

/// Warm-up prefetches that failed. Never affects request-path results.
///
/// Labels: `api_type`.
pub const WARMUP_FAILURES_TOTAL: &str = "meterguard_warmup_failures_total";
