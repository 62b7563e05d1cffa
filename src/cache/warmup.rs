//! Background refresh of popular entries shortly before they expire.
//!
//! The task only selects candidates and hands them to a [`WarmupHandler`];
//! the handler knows how to replay a call for its api type. Prefetch failures
//! are logged and counted, never surfaced to request paths.

use super::manager::AdaptiveCache;
use super::tracker::WarmCandidate;
use crate::config::durations::secs;
use crate::telemetry::{names, MetricsSink};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub enabled: bool,
    #[serde(rename = "interval_secs", with = "secs")]
    pub interval: Duration,
    /// Minimum lifetime reads before an entry is worth refreshing.
    pub access_threshold: u64,
    /// Entries expiring within this window are refreshed.
    #[serde(rename = "refresh_window_secs", with = "secs")]
    pub refresh_window: Duration,
    pub max_candidates: usize,
    /// Prefetches in flight at once.
    pub concurrency: usize,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(300),
            access_threshold: 10,
            refresh_window: Duration::from_secs(600),
            max_candidates: 100,
            concurrency: 4,
        }
    }
}

/// Re-fetches one candidate and stores the fresh response.
#[async_trait]
pub trait WarmupHandler: Send + Sync {
    async fn prefetch(&self, candidate: &WarmCandidate) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmupReport {
    pub candidates: usize,
    pub refreshed: usize,
    pub failed: usize,
}

pub struct WarmupTask {
    cache: Arc<AdaptiveCache>,
    handler: Arc<dyn WarmupHandler>,
    config: WarmupConfig,
    metrics: Arc<dyn MetricsSink>,
}

impl WarmupTask {
    pub fn new(
        cache: Arc<AdaptiveCache>,
        handler: Arc<dyn WarmupHandler>,
        config: WarmupConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            cache,
            handler,
            config,
            metrics,
        }
    }

    /// One selection and prefetch round.
    pub async fn run_once(&self) -> WarmupReport {
        let candidates = self.cache.warm_candidates(
            self.config.access_threshold,
            self.config.refresh_window,
            self.config.max_candidates,
        );
        let mut report = WarmupReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        // Owned items keep the round's future `Send` for `tokio::spawn`.
        let outcomes: Vec<bool> = futures::stream::iter(candidates)
            .map(|c| async move {
                let labels = [("api_type", c.api_type.as_str())];
                self.metrics
                    .increment_counter(names::WARMUP_CANDIDATES_TOTAL, 1, &labels);
                match self.handler.prefetch(&c).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(api_type = %c.api_type, key = %c.storage_key, error = %e, "Warm-up prefetch failed");
                        self.metrics
                            .increment_counter(names::WARMUP_FAILURES_TOTAL, 1, &labels);
                        false
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;
        report.refreshed = outcomes.iter().filter(|ok| **ok).count();
        report.failed = outcomes.len() - report.refreshed;
        if report.candidates > 0 {
            debug!(
                candidates = report.candidates,
                refreshed = report.refreshed,
                failed = report.failed,
                "Warm-up round finished"
            );
        }
        report
    }

    /// Runs rounds every `interval` until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.config.interval.as_secs(), "Cache warm-up started");
            let mut ticker = tokio::time::interval(self.config.interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
            info!("Cache warm-up stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryCache;
    use crate::cache::manager::CacheConfig;
    use crate::telemetry::{noop_sink, InMemoryMetricsSink};
    use crate::types::{ApiType, Response};
    use crate::Error;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Refetch {
        cache: Arc<AdaptiveCache>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl WarmupHandler for Refetch {
        async fn prefetch(&self, c: &WarmCandidate) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::validation_with_context("upstream down", Default::default()));
            }
            let fresh = Response {
                status_code: 200,
                body: json!({"fresh": true}),
                cache: None,
            };
            self.cache
                .set(c.api_type, &c.params, &fresh, Some(Duration::from_secs(3600)))
                .await?;
            Ok(())
        }
    }

    async fn popular_entry(cache: &AdaptiveCache) {
        let p = json!({"address": "X"});
        let r = Response {
            status_code: 200,
            body: json!({"fresh": false}),
            cache: None,
        };
        cache
            .set(ApiType::Geocoding, &p, &r, Some(Duration::from_secs(900)))
            .await
            .unwrap();
        for _ in 0..3 {
            cache.get(ApiType::Geocoding, &p).await.unwrap();
        }
    }

    fn config() -> WarmupConfig {
        WarmupConfig {
            enabled: true,
            interval: Duration::from_secs(60),
            access_threshold: 3,
            refresh_window: Duration::from_secs(600),
            max_candidates: 10,
            concurrency: 2,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_popular_entries_near_expiry() {
        let cache = Arc::new(AdaptiveCache::new(
            CacheConfig::default(),
            Arc::new(MemoryCache::new(10)),
            noop_sink(),
        ));
        popular_entry(&cache).await;
        let handler = Arc::new(Refetch {
            cache: cache.clone(),
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let task = WarmupTask::new(cache.clone(), handler.clone(), config(), noop_sink());

        assert_eq!(task.run_once().await.candidates, 0);
        tokio::time::advance(Duration::from_secs(400)).await;
        let report = task.run_once().await;
        assert_eq!(report, WarmupReport { candidates: 1, refreshed: 1, failed: 0 });

        let hit = cache
            .get(ApiType::Geocoding, &json!({"address": "X"}))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body, json!({"fresh": true}));
        // prefetch is not a hit
        assert_eq!(cache.savings(ApiType::Geocoding).api_calls_saved, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_not_raised() {
        let metrics = Arc::new(InMemoryMetricsSink::new());
        let cache = Arc::new(AdaptiveCache::new(
            CacheConfig::default(),
            Arc::new(MemoryCache::new(10)),
            noop_sink(),
        ));
        popular_entry(&cache).await;
        tokio::time::advance(Duration::from_secs(400)).await;
        let handler = Arc::new(Refetch {
            cache: cache.clone(),
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let task = WarmupTask::new(cache, handler, config(), metrics.clone());
        let report = task.run_once().await;
        assert_eq!(report.failed, 1);
        assert_eq!(metrics.counter_total(names::WARMUP_FAILURES_TOTAL), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_stops_on_cancel() {
        let cache = Arc::new(AdaptiveCache::new(
            CacheConfig::default(),
            Arc::new(MemoryCache::new(10)),
            noop_sink(),
        ));
        popular_entry(&cache).await;
        let handler = Arc::new(Refetch {
            cache: cache.clone(),
            calls: AtomicUsize::new(0),
            fail: false,
        });
        let cancel = CancellationToken::new();
        let handle = WarmupTask::new(cache, handler.clone(), config(), noop_sink())
            .spawn(cancel.clone());

        tokio::time::sleep(Duration::from_secs(400)).await;
        assert!(handler.calls.load(Ordering::SeqCst) >= 1);
        cancel.cancel();
        handle.await.unwrap();
    }
}
