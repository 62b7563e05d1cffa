//! Adaptive response cache.

use super::backend::CacheBackend;
use super::cost::{ApiSavings, CostLedger, CostReport};
use super::key::{FingerprintGenerator, RequestFingerprint};
use super::tracker::{AccessTracker, WarmCandidate};
use crate::config::durations::secs;
use crate::telemetry::{names, MetricsSink};
use crate::types::{ApiType, CacheMetadata, Response};
use crate::utils::glob::GlobPattern;
use crate::utils::unix_millis;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lower clamp for adaptive TTLs.
    #[serde(rename = "min_ttl_secs", with = "secs")]
    pub min_ttl: Duration,
    /// Upper clamp for adaptive TTLs.
    #[serde(rename = "max_ttl_secs", with = "secs")]
    pub max_ttl: Duration,
    /// Largest payload, in bytes of serialized JSON, that will be stored.
    pub max_entry_size: usize,
    pub key_prefix: String,
    /// Fixed TTL per api type; wins over the adaptive computation.
    pub ttl_overrides_secs: BTreeMap<ApiType, u64>,
    #[serde(rename = "history_retention_secs", with = "secs")]
    pub history_retention: Duration,
    /// Access timestamps kept per entry.
    pub max_history_samples: usize,
    /// Keys fetched per backend scan round during bulk invalidation.
    pub scan_batch: usize,
    /// Capacity of the built-in memory backend.
    pub max_entries: usize,
    /// Hits remembered for period cost reports.
    pub savings_ledger_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_ttl: Duration::from_secs(300),
            max_ttl: Duration::from_secs(86_400),
            max_entry_size: 1024 * 1024,
            key_prefix: "mg".to_string(),
            ttl_overrides_secs: BTreeMap::new(),
            history_retention: Duration::from_secs(7 * 86_400),
            max_history_samples: 1000,
            scan_batch: 100,
            max_entries: 10_000,
            savings_ledger_capacity: 100_000,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn with_ttl_override(mut self, api_type: ApiType, ttl: Duration) -> Self {
        self.ttl_overrides_secs.insert(api_type, ttl.as_secs());
        self
    }

    pub fn with_ttl_bounds(mut self, min: Duration, max: Duration) -> Self {
        self.min_ttl = min;
        self.max_ttl = max;
        self
    }

    pub fn with_max_entry_size(mut self, bytes: usize) -> Self {
        self.max_entry_size = bytes;
        self
    }
}

/// Which rule produced an entry's TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlSource {
    Forced,
    Configured,
    Adaptive,
    Default,
}

/// Stored alongside every payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    api_type: ApiType,
    fingerprint: String,
    status_code: u16,
    payload: Value,
    cached_at_ms: u64,
    ttl_secs: u64,
    ttl_source: TtlSource,
    size: usize,
    access_count: u64,
}

/// Inspection view of a stored entry; reading it does not count as a hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedEntry {
    pub storage_key: String,
    pub cached_at_ms: u64,
    pub ttl_secs: u64,
    pub ttl_source: TtlSource,
    pub size: usize,
    pub access_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApiCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub rejected: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub rejected: u64,
    pub deletes: u64,
    pub errors: u64,
    pub per_api: BTreeMap<ApiType, ApiCacheStats>,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct ApiCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    rejected: AtomicU64,
}

struct AtomicStats {
    per_api: BTreeMap<ApiType, ApiCounters>,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn new() -> Self {
        Self {
            per_api: ApiType::ALL.iter().map(|a| (*a, ApiCounters::default())).collect(),
            deletes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn api(&self, api_type: ApiType) -> Option<&ApiCounters> {
        self.per_api.get(&api_type)
    }

    fn to_stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            ..Default::default()
        };
        for (api, c) in &self.per_api {
            let s = ApiCacheStats {
                hits: c.hits.load(Ordering::Relaxed),
                misses: c.misses.load(Ordering::Relaxed),
                sets: c.sets.load(Ordering::Relaxed),
                rejected: c.rejected.load(Ordering::Relaxed),
            };
            stats.hits += s.hits;
            stats.misses += s.misses;
            stats.sets += s.sets;
            stats.rejected += s.rejected;
            stats.per_api.insert(*api, s);
        }
        stats
    }

    fn reset(&self) {
        for c in self.per_api.values() {
            c.hits.store(0, Ordering::Relaxed);
            c.misses.store(0, Ordering::Relaxed);
            c.sets.store(0, Ordering::Relaxed);
            c.rejected.store(0, Ordering::Relaxed);
        }
        self.deletes.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }
}

/// Response cache keyed by request fingerprint, with TTLs learned from how
/// often each entry is actually read.
///
/// TTL precedence on `set`: forced, then the per-api override, then the P90
/// of observed inter-access gaps (clamped to `[min_ttl, max_ttl]`), then the
/// api type's default.
pub struct AdaptiveCache {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    fingerprints: FingerprintGenerator,
    tracker: AccessTracker,
    ledger: CostLedger,
    stats: AtomicStats,
    metrics: Arc<dyn MetricsSink>,
}

impl AdaptiveCache {
    pub fn new(
        config: CacheConfig,
        backend: Arc<dyn CacheBackend>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            tracker: AccessTracker::new(config.history_retention, config.max_history_samples),
            ledger: CostLedger::new(config.savings_ledger_capacity),
            fingerprints: FingerprintGenerator::new(),
            stats: AtomicStats::new(),
            config,
            backend,
            metrics,
        }
    }

    pub fn with_fingerprints(mut self, generator: FingerprintGenerator) -> Self {
        self.fingerprints = generator;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn fingerprint(&self, api_type: ApiType, params: &Value) -> RequestFingerprint {
        self.fingerprints.generate(api_type, params)
    }

    pub fn storage_key(&self, api_type: ApiType, params: &Value) -> String {
        self.fingerprint(api_type, params)
            .storage_key(&self.config.key_prefix)
    }

    /// Cached response for `params`, tagged with cache metadata. A hit counts
    /// toward the entry's access history and toward cost saved.
    pub async fn get(&self, api_type: ApiType, params: &Value) -> Result<Option<Response>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let key = self.storage_key(api_type, params);
        let labels = [("api_type", api_type.as_str())];
        let bytes = match self.backend.get(&key).await {
            Ok(b) => b,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };
        let Some(bytes) = bytes else {
            self.count_miss(api_type);
            return Ok(None);
        };
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping undecodable cache entry");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                let _ = self.backend.delete(&key).await;
                self.count_miss(api_type);
                return Ok(None);
            }
        };

        let now = Instant::now();
        let hits = self.tracker.record_hit(&key, now);
        let saved = self.ledger.record_hit(api_type, now);
        if let Some(c) = self.stats.api(api_type) {
            c.hits.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.increment_counter(names::CACHE_HITS_TOTAL, 1, &labels);
        self.metrics
            .increment_counter(names::COST_SAVED_MICROS_TOTAL, saved, &labels);

        let now_ms = unix_millis();
        Ok(Some(Response {
            status_code: envelope.status_code,
            body: envelope.payload,
            cache: Some(CacheMetadata {
                cached: true,
                fingerprint: envelope.fingerprint,
                cached_at_ms: envelope.cached_at_ms,
                ttl_secs: envelope.ttl_secs,
                age_secs: now_ms.saturating_sub(envelope.cached_at_ms) / 1000,
                access_count: hits.max(envelope.access_count),
            }),
        }))
    }

    /// Stores a successful response. Returns `false` when the response was
    /// refused: caching disabled, an error response, or an oversized payload.
    pub async fn set(
        &self,
        api_type: ApiType,
        params: &Value,
        response: &Response,
        force_ttl: Option<Duration>,
    ) -> Result<bool> {
        if !self.config.enabled {
            self.count_rejected(api_type, "disabled");
            return Ok(false);
        }
        if !is_cacheable(response) {
            self.count_rejected(api_type, "error_response");
            return Ok(false);
        }
        let size = serde_json::to_vec(&response.body)?.len();
        if size > self.config.max_entry_size {
            debug!(
                api_type = %api_type,
                size,
                max = self.config.max_entry_size,
                "Response too large to cache"
            );
            self.count_rejected(api_type, "oversized");
            return Ok(false);
        }

        let fp = self.fingerprint(api_type, params);
        let key = fp.storage_key(&self.config.key_prefix);
        let (ttl, ttl_source) = self.resolve_ttl_for_key(api_type, &key, force_ttl);
        let envelope = Envelope {
            api_type,
            fingerprint: fp.to_string(),
            status_code: response.status_code,
            payload: response.body.clone(),
            cached_at_ms: unix_millis(),
            ttl_secs: ttl.as_secs(),
            ttl_source,
            size,
            access_count: self.tracker.access_count(&key),
        };
        let data = serde_json::to_vec(&envelope)?;
        if let Err(e) = self.backend.set(&key, &data, ttl).await {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        self.tracker.record_set(
            &key,
            api_type,
            self.fingerprints.normalize(params),
            ttl,
            Instant::now(),
        );
        if let Some(c) = self.stats.api(api_type) {
            c.sets.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.increment_counter(
            names::CACHE_SETS_TOTAL,
            1,
            &[("api_type", api_type.as_str())],
        );
        debug!(api_type = %api_type, key = %key, ttl_secs = ttl.as_secs(), source = ?ttl_source, "Cached response");
        Ok(true)
    }

    /// Reads entry metadata without counting a hit.
    pub async fn peek(&self, api_type: ApiType, params: &Value) -> Result<Option<CachedEntry>> {
        let key = self.storage_key(api_type, params);
        let Some(bytes) = self.backend.get(&key).await? else {
            return Ok(None);
        };
        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        Ok(Some(CachedEntry {
            storage_key: key,
            cached_at_ms: envelope.cached_at_ms,
            ttl_secs: envelope.ttl_secs,
            ttl_source: envelope.ttl_source,
            size: envelope.size,
            access_count: envelope.access_count,
        }))
    }

    /// TTL the next `set` for these parameters would use.
    pub fn resolve_ttl(
        &self,
        api_type: ApiType,
        params: &Value,
        force_ttl: Option<Duration>,
    ) -> (Duration, TtlSource) {
        let key = self.storage_key(api_type, params);
        self.resolve_ttl_for_key(api_type, &key, force_ttl)
    }

    /// Adaptive TTL from access history alone; `None` until two accesses exist.
    pub fn adaptive_ttl(&self, api_type: ApiType, params: &Value) -> Option<Duration> {
        let key = self.storage_key(api_type, params);
        self.tracker
            .adaptive_ttl(&key, self.config.min_ttl, self.config.max_ttl)
    }

    fn resolve_ttl_for_key(
        &self,
        api_type: ApiType,
        key: &str,
        force_ttl: Option<Duration>,
    ) -> (Duration, TtlSource) {
        if let Some(ttl) = force_ttl {
            return (ttl, TtlSource::Forced);
        }
        if let Some(secs) = self.config.ttl_overrides_secs.get(&api_type) {
            return (Duration::from_secs(*secs), TtlSource::Configured);
        }
        if let Some(ttl) = self
            .tracker
            .adaptive_ttl(key, self.config.min_ttl, self.config.max_ttl)
        {
            return (ttl, TtlSource::Adaptive);
        }
        (api_type.default_ttl(), TtlSource::Default)
    }

    /// Drops one entry when `params` is given, otherwise every entry of `api_type`.
    /// Returns the number of entries removed.
    pub async fn invalidate(&self, api_type: ApiType, params: Option<&Value>) -> Result<u64> {
        match params {
            Some(p) => {
                let key = self.storage_key(api_type, p);
                self.tracker.forget(&key);
                let removed = self.backend.delete(&key).await?;
                if removed {
                    self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                }
                Ok(removed as u64)
            }
            None => {
                let pattern = GlobPattern::new(&format!("{}:*", api_type.as_str()))?;
                self.delete_matching(&pattern).await
            }
        }
    }

    /// Removes entries whose key, without the configured prefix, matches a
    /// `*`/`?` glob such as `routes:*`. Keys are scanned in batches.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let glob = GlobPattern::new(pattern)?;
        self.delete_matching(&glob).await
    }

    /// Removes every entry under this cache's prefix and forgets all history.
    pub async fn clear(&self) -> Result<u64> {
        let glob = GlobPattern::new("*")?;
        let removed = self.delete_matching(&glob).await?;
        self.tracker.clear();
        Ok(removed)
    }

    async fn delete_matching(&self, glob: &GlobPattern) -> Result<u64> {
        let namespace = self.namespace();
        let scan_prefix = format!("{}{}", namespace, glob.literal_prefix());
        let mut cursor: Option<String> = None;
        let mut removed = 0u64;
        loop {
            let page = self
                .backend
                .scan(&scan_prefix, cursor.as_deref(), self.config.scan_batch.max(1))
                .await?;
            for key in &page.keys {
                let local = key.strip_prefix(namespace.as_str()).unwrap_or(key);
                if !glob.matches(local) {
                    continue;
                }
                if self.backend.delete(key).await? {
                    removed += 1;
                }
                self.tracker.forget(key);
            }
            match page.cursor {
                Some(c) => cursor = Some(c),
                None => break,
            }
            tokio::task::yield_now().await;
        }
        self.stats.deletes.fetch_add(removed, Ordering::Relaxed);
        debug!(pattern = glob.as_str(), removed, "Invalidated cache entries");
        Ok(removed)
    }

    fn namespace(&self) -> String {
        if self.config.key_prefix.is_empty() {
            String::new()
        } else {
            format!("{}:", self.config.key_prefix)
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    /// Live entries in the backend.
    pub async fn entry_count(&self) -> Result<usize> {
        self.backend.len().await
    }

    /// Zeroes the hit/miss statistics. Savings are lifetime totals and stay.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Lifetime savings for one api type.
    pub fn savings(&self, api_type: ApiType) -> ApiSavings {
        self.ledger.lifetime_for(api_type)
    }

    pub fn savings_all(&self) -> Vec<ApiSavings> {
        self.ledger.lifetime()
    }

    /// Savings from hits within the trailing `period`.
    pub fn cost_report(&self, period: Duration) -> CostReport {
        self.ledger.report(period, Instant::now())
    }

    /// Entries read at least `threshold` times that expire within `refresh_window`,
    /// most popular first.
    pub fn warm_candidates(
        &self,
        threshold: u64,
        refresh_window: Duration,
        limit: usize,
    ) -> Vec<WarmCandidate> {
        self.tracker
            .candidates(threshold, refresh_window, limit, Instant::now())
    }

    fn count_miss(&self, api_type: ApiType) {
        if let Some(c) = self.stats.api(api_type) {
            c.misses.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.increment_counter(
            names::CACHE_MISSES_TOTAL,
            1,
            &[("api_type", api_type.as_str())],
        );
    }

    fn count_rejected(&self, api_type: ApiType, reason: &'static str) {
        if let Some(c) = self.stats.api(api_type) {
            c.rejected.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.increment_counter(
            names::CACHE_SET_REJECTED_TOTAL,
            1,
            &[("api_type", api_type.as_str()), ("reason", reason)],
        );
    }
}

/// Only 2xx responses without a top-level `error` field are stored.
pub fn is_cacheable(response: &Response) -> bool {
    if !(200..300).contains(&response.status_code) {
        return false;
    }
    match &response.body {
        Value::Object(map) => !map.contains_key("error"),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCache;
    use crate::telemetry::{noop_sink, InMemoryMetricsSink};
    use serde_json::json;

    fn cache() -> AdaptiveCache {
        AdaptiveCache::new(
            CacheConfig::default(),
            Arc::new(MemoryCache::new(1000)),
            noop_sink(),
        )
    }

    fn ok(body: Value) -> Response {
        Response {
            status_code: 200,
            body,
            cache: None,
        }
    }

    #[tokio::test]
    async fn set_then_get_tags_metadata() {
        let c = cache();
        let p = json!({"address": "1600 Amphitheatre"});
        assert!(c.get(ApiType::Geocoding, &p).await.unwrap().is_none());
        assert!(c.set(ApiType::Geocoding, &p, &ok(json!({"lat": 1})), None).await.unwrap());

        let hit = c.get(ApiType::Geocoding, &p).await.unwrap().unwrap();
        assert!(hit.is_cached());
        assert_eq!(hit.body, json!({"lat": 1}));
        let meta = hit.cache.unwrap();
        assert_eq!(meta.ttl_secs, 86_400);
        assert_eq!(meta.access_count, 1);
        assert!(meta.fingerprint.starts_with("geocoding:"));

        let stats = c.stats();
        assert_eq!((stats.hits, stats.misses, stats.sets), (1, 1, 1));
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn error_responses_are_never_stored() {
        let metrics = Arc::new(InMemoryMetricsSink::new());
        let c = AdaptiveCache::new(
            CacheConfig::default(),
            Arc::new(MemoryCache::new(10)),
            metrics.clone(),
        );
        let p = json!({"q": 1});
        let server_error = Response {
            status_code: 503,
            body: json!({}),
            cache: None,
        };
        assert!(!c.set(ApiType::Places, &p, &server_error, None).await.unwrap());
        assert!(!c
            .set(ApiType::Places, &p, &ok(json!({"error": "quota"})), None)
            .await
            .unwrap());
        assert!(c.get(ApiType::Places, &p).await.unwrap().is_none());
        assert_eq!(
            metrics.counter(
                names::CACHE_SET_REJECTED_TOTAL,
                &[("api_type", "places"), ("reason", "error_response")]
            ),
            2
        );
    }

    #[tokio::test]
    async fn oversized_payloads_are_refused() {
        let c = AdaptiveCache::new(
            CacheConfig::default().with_max_entry_size(16),
            Arc::new(MemoryCache::new(10)),
            noop_sink(),
        );
        let big = ok(json!({"blob": "x".repeat(64)}));
        assert!(!c.set(ApiType::MlInference, &json!({}), &big, None).await.unwrap());
        assert_eq!(c.stats().rejected, 1);
    }

    #[tokio::test]
    async fn disabled_cache_is_inert() {
        let c = AdaptiveCache::new(
            CacheConfig::default().with_enabled(false),
            Arc::new(MemoryCache::new(10)),
            noop_sink(),
        );
        let p = json!({});
        assert!(!c.set(ApiType::Routes, &p, &ok(json!(1)), None).await.unwrap());
        assert!(c.get(ApiType::Routes, &p).await.unwrap().is_none());
        assert_eq!(c.stats().misses, 0);
    }

    #[tokio::test]
    async fn ttl_precedence() {
        let c = AdaptiveCache::new(
            CacheConfig::default().with_ttl_override(ApiType::Routes, Duration::from_secs(120)),
            Arc::new(MemoryCache::new(10)),
            noop_sink(),
        );
        let p = json!({"o": "a"});
        assert_eq!(
            c.resolve_ttl(ApiType::Routes, &p, Some(Duration::from_secs(5))),
            (Duration::from_secs(5), TtlSource::Forced)
        );
        assert_eq!(
            c.resolve_ttl(ApiType::Routes, &p, None),
            (Duration::from_secs(120), TtlSource::Configured)
        );
        assert_eq!(
            c.resolve_ttl(ApiType::DistanceMatrix, &p, None),
            (Duration::from_secs(1800), TtlSource::Default)
        );
    }

    #[tokio::test]
    async fn invalidate_single_and_by_api_type() {
        let c = cache();
        for i in 0..5 {
            c.set(ApiType::Routes, &json!({"i": i}), &ok(json!(i)), None)
                .await
                .unwrap();
        }
        c.set(ApiType::Places, &json!({"i": 0}), &ok(json!(0)), None)
            .await
            .unwrap();

        assert_eq!(c.invalidate(ApiType::Routes, Some(&json!({"i": 0}))).await.unwrap(), 1);
        assert_eq!(c.invalidate(ApiType::Routes, Some(&json!({"i": 0}))).await.unwrap(), 0);
        assert_eq!(c.invalidate(ApiType::Routes, None).await.unwrap(), 4);
        assert!(c.get(ApiType::Places, &json!({"i": 0})).await.unwrap().is_some());
        assert_eq!(c.clear().await.unwrap(), 1);
        assert_eq!(c.entry_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn invalidate_pattern_scans_in_batches() {
        let mut config = CacheConfig::default();
        config.scan_batch = 2;
        let c = AdaptiveCache::new(config, Arc::new(MemoryCache::new(100)), noop_sink());
        for i in 0..9 {
            c.set(ApiType::Elevation, &json!({"i": i}), &ok(json!(i)), None)
                .await
                .unwrap();
        }
        c.set(ApiType::Timezone, &json!({"i": 0}), &ok(json!(0)), None)
            .await
            .unwrap();
        assert_eq!(c.invalidate_pattern("elevation:*").await.unwrap(), 9);
        assert_eq!(c.entry_count().await.unwrap(), 1);
        assert!(c.invalidate_pattern("[").await.is_ok());
    }

    #[tokio::test]
    async fn hits_accumulate_cost_saved() {
        let c = cache();
        let p = json!({"place": "cafe"});
        c.set(ApiType::Places, &p, &ok(json!({"id": 1})), None)
            .await
            .unwrap();
        for _ in 0..4 {
            c.get(ApiType::Places, &p).await.unwrap();
        }
        let s = c.savings(ApiType::Places);
        assert_eq!(s.api_calls_saved, 4);
        assert_eq!(s.cost_saved_micros, 4 * 17_000);
        let report = c.cost_report(Duration::from_secs(3600));
        assert_eq!(report.total_cost_saved_micros, 68_000);
    }

    #[tokio::test]
    async fn reset_stats_keeps_lifetime_savings() {
        let c = cache();
        let p = json!({"route": "a-b"});
        c.set(ApiType::Routes, &p, &ok(json!({"km": 3})), None)
            .await
            .unwrap();
        for _ in 0..3 {
            c.get(ApiType::Routes, &p).await.unwrap();
        }
        let before = c.savings(ApiType::Routes);
        c.reset_stats();
        assert_eq!(c.stats().hits, 0);
        assert_eq!(c.savings(ApiType::Routes), before);
        assert_eq!(c.cost_report(Duration::from_secs(3600)).total_calls_saved, 3);

        c.get(ApiType::Routes, &p).await.unwrap();
        assert_eq!(c.stats().hits, 1);
        assert_eq!(c.savings(ApiType::Routes).api_calls_saved, 4);
    }

    #[tokio::test]
    async fn undecodable_entries_read_as_misses() {
        let backend = Arc::new(MemoryCache::new(10));
        let c = AdaptiveCache::new(CacheConfig::default(), backend.clone(), noop_sink());
        let p = json!({"x": 1});
        let key = c.storage_key(ApiType::Routes, &p);
        backend.set(&key, b"not json", Duration::from_secs(60)).await.unwrap();
        assert!(c.get(ApiType::Routes, &p).await.unwrap().is_none());
        assert_eq!(c.stats().errors, 1);
        assert!(backend.get(&key).await.unwrap().is_none());
    }
}
