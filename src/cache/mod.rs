//! 自适应缓存模块：按请求指纹缓存响应，并根据访问模式调整 TTL。
//!
//! # Adaptive Cache Module
//!
//! Every cache hit is a metered call that was not made. This module stores
//! successful responses under a fingerprint of their request parameters and
//! learns how long each entry should live from how often it is read.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`AdaptiveCache`] | Get/set/invalidate with adaptive TTLs, stats and cost savings |
//! | [`CacheConfig`] | TTL bounds, overrides, size limits and key prefix |
//! | [`CacheBackend`] | Trait for storage backends with prefix scans |
//! | [`MemoryCache`] | In-process backend with expiry and LRU eviction |
//! | [`NullCache`] | Backend that stores nothing |
//! | [`FingerprintGenerator`] | Canonical request hashing with volatile-field removal |
//! | [`WarmupTask`] | Periodic refresh of popular entries nearing expiry |
//!
//! ## TTL Selection
//!
//! | Source | When |
//! |--------|------|
//! | Forced | Caller passes an explicit TTL |
//! | Configured | `ttl_overrides_secs` has the api type |
//! | Adaptive | Two or more recorded reads: P90 of read gaps, clamped to `[min_ttl, max_ttl]` |
//! | Default | Otherwise, the api type's built-in TTL |
//!
//! ## Example
//!
//! ```rust
//! use meterguard::cache::{AdaptiveCache, CacheConfig, MemoryCache};
//! use meterguard::telemetry::noop_sink;
//! use meterguard::types::Response;
//! use meterguard::ApiType;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cache = AdaptiveCache::new(CacheConfig::default(), Arc::new(MemoryCache::new(1000)), noop_sink());
//! let params = json!({"address": "1600 Amphitheatre Pkwy"});
//! let response = Response { status_code: 200, body: json!({"lat": 37.42}), cache: None };
//!
//! assert!(cache.set(ApiType::Geocoding, &params, &response, None).await.unwrap());
//! let hit = cache.get(ApiType::Geocoding, &params).await.unwrap().unwrap();
//! assert!(hit.is_cached());
//! # });
//! ```

mod backend;
mod cost;
mod key;
mod manager;
mod tracker;
pub mod warmup;

pub use backend::{CacheBackend, MemoryCache, NullCache, ScanPage};
pub use cost::{ApiSavings, CostReport};
pub use key::{FingerprintGenerator, RequestFingerprint, VOLATILE_FIELDS};
pub use manager::{
    is_cacheable, AdaptiveCache, ApiCacheStats, CacheConfig, CacheStats, CachedEntry, TtlSource,
};
pub use tracker::{percentile, WarmCandidate};
pub use warmup::{WarmupConfig, WarmupHandler, WarmupReport, WarmupTask};
