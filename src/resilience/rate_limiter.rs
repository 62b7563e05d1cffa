use crate::config::durations::secs;
use crate::telemetry::{names, MetricsSink};
use crate::types::{ApiType, Tier};
use crate::utils::instant_after;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Counting algorithm and its base parameters for one api type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum RateLimitRule {
    /// At most `limit` units within any trailing `window`.
    SlidingWindow {
        limit: u64,
        #[serde(rename = "window_secs", with = "secs")]
        window: Duration,
    },
    /// Continuously refilling bucket of `capacity` units.
    TokenBucket { capacity: u64, refill_per_sec: f64 },
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self::SlidingWindow {
            limit: 600,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitRule {
    pub fn sliding_window(limit: u64, window: Duration) -> Self {
        Self::SlidingWindow { limit, window }
    }

    pub fn token_bucket(capacity: u64, refill_per_sec: f64) -> Self {
        Self::TokenBucket {
            capacity,
            refill_per_sec,
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::SlidingWindow { .. } => "sliding_window",
            Self::TokenBucket { .. } => "token_bucket",
        }
    }

    pub fn limit(&self) -> u64 {
        match self {
            Self::SlidingWindow { limit, .. } => *limit,
            Self::TokenBucket { capacity, .. } => *capacity,
        }
    }

    /// Scale limit/capacity and refill rate by a tier multiplier. Never below 1.
    pub fn scaled(&self, multiplier: f64) -> Self {
        let scale = |v: u64| ((v as f64 * multiplier).floor() as u64).max(1);
        match self {
            Self::SlidingWindow { limit, window } => Self::SlidingWindow {
                limit: scale(*limit),
                window: *window,
            },
            Self::TokenBucket {
                capacity,
                refill_per_sec,
            } => Self::TokenBucket {
                capacity: scale(*capacity),
                refill_per_sec: refill_per_sec * multiplier,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    pub enabled: bool,
    pub default_rule: RateLimitRule,
    pub per_api: BTreeMap<ApiType, RateLimitRule>,
    /// Overrides for [`Tier::default_multiplier`].
    pub tier_multipliers: BTreeMap<Tier, f64>,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_rule: RateLimitRule::default(),
            per_api: BTreeMap::new(),
            tier_multipliers: BTreeMap::new(),
        }
    }
}

impl RateLimiterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, api_type: ApiType, rule: RateLimitRule) -> Self {
        self.per_api.insert(api_type, rule);
        self
    }

    pub fn with_default_rule(mut self, rule: RateLimitRule) -> Self {
        self.default_rule = rule;
        self
    }

    pub fn with_tier_multiplier(mut self, tier: Tier, multiplier: f64) -> Self {
        self.tier_multipliers.insert(tier, multiplier);
        self
    }

    pub fn multiplier(&self, tier: Tier) -> f64 {
        self.tier_multipliers
            .get(&tier)
            .copied()
            .unwrap_or_else(|| tier.default_multiplier())
    }

    /// Effective rule for an api type at a tier.
    pub fn rule_for(&self, api_type: ApiType, tier: Tier) -> RateLimitRule {
        self.per_api
            .get(&api_type)
            .unwrap_or(&self.default_rule)
            .scaled(self.multiplier(tier))
    }
}

/// Identity of one counter: api type, tier and an optional caller subject
/// (user, tenant, API key id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey {
    pub api_type: ApiType,
    pub tier: Tier,
    pub subject: Option<String>,
}

impl RateLimitKey {
    pub fn new(api_type: ApiType, tier: Tier) -> Self {
        Self {
            api_type,
            tier,
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.api_type, self.tier)?;
        if let Some(ref s) = self.subject {
            write!(f, ":{}", s)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateLimitDecision {
    pub key: String,
    pub limit: u64,
    /// Units left in the current window (or bucket) after this check.
    pub remaining: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub key: String,
    pub api_type: ApiType,
    pub tier: Tier,
    pub algorithm: &'static str,
    pub limit: u64,
    pub remaining: u64,
    /// Time until at least one unit is available again, if currently exhausted.
    pub reset_after_ms: Option<u64>,
}

#[derive(Debug)]
enum Counter {
    Window {
        limit: u64,
        window: Duration,
        hits: VecDeque<Instant>,
    },
    Bucket {
        capacity: f64,
        refill_per_sec: f64,
        tokens: f64,
        last: Instant,
    },
}

impl Counter {
    fn new(rule: &RateLimitRule, now: Instant) -> Self {
        match rule {
            RateLimitRule::SlidingWindow { limit, window } => Counter::Window {
                limit: *limit,
                window: *window,
                hits: VecDeque::new(),
            },
            RateLimitRule::TokenBucket {
                capacity,
                refill_per_sec,
            } => Counter::Bucket {
                capacity: *capacity as f64,
                refill_per_sec: *refill_per_sec,
                tokens: *capacity as f64,
                last: now,
            },
        }
    }

    fn limit(&self) -> u64 {
        match self {
            Counter::Window { limit, .. } => *limit,
            Counter::Bucket { capacity, .. } => *capacity as u64,
        }
    }

    fn algorithm(&self) -> &'static str {
        match self {
            Counter::Window { .. } => "sliding_window",
            Counter::Bucket { .. } => "token_bucket",
        }
    }

    /// Admit `cost` units or return how long until they could be admitted.
    fn try_take(&mut self, cost: u64, now: Instant) -> std::result::Result<u64, Duration> {
        match self {
            Counter::Window {
                limit,
                window,
                hits,
            } => {
                while let Some(&front) = hits.front() {
                    if now.duration_since(front) >= *window {
                        hits.pop_front();
                    } else {
                        break;
                    }
                }
                let used = hits.len() as u64;
                if used + cost <= *limit {
                    for _ in 0..cost {
                        hits.push_back(now);
                    }
                    Ok(*limit - used - cost)
                } else if cost > *limit {
                    Err(*window)
                } else {
                    // The (used + cost - limit)-th oldest hit must age out first.
                    let idx = (used + cost - *limit - 1) as usize;
                    let wait = hits
                        .get(idx)
                        .map(|t| instant_after(*t, *window).saturating_duration_since(now))
                        .unwrap_or(*window);
                    Err(wait)
                }
            }
            Counter::Bucket {
                capacity,
                refill_per_sec,
                tokens,
                last,
            } => {
                let elapsed = now.duration_since(*last).as_secs_f64();
                if elapsed > 0.0 {
                    *tokens = (*tokens + elapsed * *refill_per_sec).min(*capacity);
                    *last = now;
                }
                let needed = cost as f64;
                if *tokens >= needed {
                    *tokens -= needed;
                    Ok(tokens.floor() as u64)
                } else {
                    let missing = needed - *tokens;
                    let wait = if *refill_per_sec > 0.0 && needed <= *capacity {
                        Duration::try_from_secs_f64(missing / *refill_per_sec).unwrap_or(Duration::MAX)
                    } else {
                        Duration::MAX
                    };
                    Err(wait)
                }
            }
        }
    }

    /// Pure read of (remaining, time until one unit frees up).
    fn peek(&self, now: Instant) -> (u64, Option<Duration>) {
        match self {
            Counter::Window {
                limit,
                window,
                hits,
            } => {
                let live: Vec<_> = hits
                    .iter()
                    .filter(|t| now.duration_since(**t) < *window)
                    .collect();
                let remaining = limit.saturating_sub(live.len() as u64);
                let reset = if remaining == 0 {
                    live.first()
                        .map(|t| instant_after(**t, *window).saturating_duration_since(now))
                } else {
                    None
                };
                (remaining, reset)
            }
            Counter::Bucket {
                capacity,
                refill_per_sec,
                tokens,
                last,
            } => {
                let elapsed = now.duration_since(*last).as_secs_f64();
                let current = (*tokens + elapsed * *refill_per_sec).min(*capacity);
                let reset = if current < 1.0 && *refill_per_sec > 0.0 {
                    Some(
                        Duration::try_from_secs_f64((1.0 - current) / *refill_per_sec)
                            .unwrap_or(Duration::MAX),
                    )
                } else {
                    None
                };
                (current.floor() as u64, reset)
            }
        }
    }

    /// `true` when the counter is indistinguishable from a fresh one: no hit
    /// left in the window, or a bucket refilled to capacity.
    fn is_idle(&self, now: Instant) -> bool {
        match self {
            Counter::Window { window, hits, .. } => hits
                .back()
                .map_or(true, |t| now.duration_since(*t) >= *window),
            Counter::Bucket {
                capacity,
                refill_per_sec,
                tokens,
                last,
            } => {
                let elapsed = now.duration_since(*last).as_secs_f64();
                *tokens + elapsed * *refill_per_sec >= *capacity
            }
        }
    }
}

/// How often `check` drops idle counters.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Keyed rate limiter.
///
/// Each key owns one counter behind its own async mutex, so the
/// check-and-increment is atomic per key and different keys never contend.
/// Counters that went idle are dropped periodically, so per-subject keys do
/// not accumulate.
pub struct RateLimiter {
    cfg: RateLimiterConfig,
    counters: RwLock<HashMap<RateLimitKey, Arc<Mutex<Counter>>>>,
    last_sweep: StdMutex<Instant>,
    metrics: Arc<dyn MetricsSink>,
}

impl RateLimiter {
    pub fn new(cfg: RateLimiterConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            cfg,
            counters: RwLock::new(HashMap::new()),
            last_sweep: StdMutex::new(Instant::now()),
            metrics,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.cfg
    }

    fn counter(&self, key: &RateLimitKey) -> Arc<Mutex<Counter>> {
        {
            let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(c) = counters.get(key) {
                return Arc::clone(c);
            }
        }
        let rule = self.cfg.rule_for(key.api_type, key.tier);
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            counters
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Counter::new(&rule, Instant::now())))),
        )
    }

    /// Admit `cost` units for `key`, or fail with [`Error::RateLimitExceeded`].
    pub async fn check(&self, key: &RateLimitKey, cost: u64) -> Result<RateLimitDecision> {
        if !self.cfg.enabled {
            return Ok(RateLimitDecision {
                key: key.to_string(),
                limit: u64::MAX,
                remaining: u64::MAX,
            });
        }
        self.sweep_idle(Instant::now());
        let counter = self.counter(key);
        let mut counter = counter.lock().await;
        let limit = counter.limit();
        match counter.try_take(cost, Instant::now()) {
            Ok(remaining) => Ok(RateLimitDecision {
                key: key.to_string(),
                limit,
                remaining,
            }),
            Err(reset_after) => {
                debug!(key = %key, limit, "rate limit exceeded");
                self.metrics.increment_counter(
                    names::RATE_LIMIT_REJECTIONS_TOTAL,
                    1,
                    &[("api_type", key.api_type.as_str()), ("tier", key.tier.as_str())],
                );
                Err(Error::RateLimitExceeded {
                    api_type: key.api_type,
                    key: key.to_string(),
                    limit,
                    remaining: 0,
                    reset_after_ms: reset_after.as_millis().min(u64::MAX as u128) as u64,
                })
            }
        }
    }

    /// `true` if the check passed. Convenience wrapper over [`check`](Self::check).
    pub async fn try_acquire(&self, key: &RateLimitKey) -> bool {
        self.check(key, 1).await.is_ok()
    }

    pub async fn snapshot(&self, key: &RateLimitKey) -> Option<RateLimiterSnapshot> {
        let counter = {
            let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            counters.get(key).cloned()
        }?;
        let counter = counter.lock().await;
        let (remaining, reset) = counter.peek(Instant::now());
        Some(RateLimiterSnapshot {
            key: key.to_string(),
            api_type: key.api_type,
            tier: key.tier,
            algorithm: counter.algorithm(),
            limit: counter.limit(),
            remaining,
            reset_after_ms: reset.map(|d| d.as_millis() as u64),
        })
    }

    pub async fn snapshots_for(&self, api_type: ApiType) -> Vec<RateLimiterSnapshot> {
        let mut keys: Vec<RateLimitKey> = {
            let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
            counters
                .keys()
                .filter(|k| k.api_type == api_type)
                .cloned()
                .collect()
        };
        keys.sort();
        let mut out = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(s) = self.snapshot(key).await {
                out.push(s);
            }
        }
        out
    }

    /// Drops idle counters at most once per [`IDLE_SWEEP_INTERVAL`]. A counter
    /// still referenced outside the map is in use and stays.
    fn sweep_idle(&self, now: Instant) {
        {
            let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last) < IDLE_SWEEP_INTERVAL {
                return;
            }
            *last = now;
        }
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        let before = counters.len();
        counters.retain(|_, c| {
            if Arc::strong_count(c) > 1 {
                return true;
            }
            match c.try_lock() {
                Ok(counter) => !counter.is_idle(now),
                Err(_) => true,
            }
        });
        let dropped = before - counters.len();
        if dropped > 0 {
            debug!(dropped, remaining = counters.len(), "dropped idle rate limit counters");
        }
    }

    /// Number of keys currently holding a counter.
    pub fn tracked_keys(&self) -> usize {
        self.counters.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop every counter of `api_type`; the next check starts fresh.
    pub fn reset(&self, api_type: ApiType) {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        counters.retain(|k, _| k.api_type != api_type);
    }
}
