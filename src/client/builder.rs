use crate::cache::{AdaptiveCache, CacheBackend, FingerprintGenerator, MemoryCache, WarmupHandler, WarmupTask};
use crate::client::core::ApiGuard;
use crate::config::GuardConfig;
use crate::resilience::{CircuitBreakerRegistry, RateLimiter, RetryPolicy};
use crate::telemetry::MetricsSink;
use crate::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Builder for [`ApiGuard`].
///
/// Defaults: [`GuardConfig::default`], an in-memory cache sized by
/// `cache.max_entries`, and a no-op metrics sink.
pub struct ApiGuardBuilder {
    config: GuardConfig,
    backend: Option<Arc<dyn CacheBackend>>,
    metrics: Arc<dyn MetricsSink>,
    fingerprints: Option<FingerprintGenerator>,
}

impl ApiGuardBuilder {
    pub fn new() -> Self {
        Self {
            config: GuardConfig::default(),
            backend: None,
            metrics: crate::telemetry::noop_sink(),
            fingerprints: None,
        }
    }

    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = config;
        self
    }

    /// Shared cache store, e.g. one backend reachable by several instances.
    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Inject a metrics sink. Default is a no-op sink.
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    pub fn fingerprints(mut self, generator: FingerprintGenerator) -> Self {
        self.fingerprints = Some(generator);
        self
    }

    /// Validate the configuration and assemble the guard.
    pub fn build(self) -> Result<ApiGuard> {
        self.config.validate()?;
        let config = self.config;
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(MemoryCache::new(config.cache.max_entries)));

        let mut cache = AdaptiveCache::new(config.cache.clone(), backend, Arc::clone(&self.metrics));
        if let Some(g) = self.fingerprints {
            cache = cache.with_fingerprints(g);
        }

        Ok(ApiGuard {
            breakers: Arc::new(CircuitBreakerRegistry::new(
                config.circuit_breaker.clone(),
                Arc::clone(&self.metrics),
            )),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limits.clone(),
                Arc::clone(&self.metrics),
            )),
            retry: RetryPolicy::new(config.retry.clone()),
            cache: Arc::new(cache),
            metrics: self.metrics,
            config,
        })
    }
}

impl Default for ApiGuardBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiGuard {
    /// Start the background warm-up task when `warmup.enabled` is set.
    /// The task runs until `cancel` fires.
    pub fn spawn_warmup(
        &self,
        handler: Arc<dyn WarmupHandler>,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if !self.config.warmup.enabled {
            return None;
        }
        let task = WarmupTask::new(
            Arc::clone(&self.cache),
            handler,
            self.config.warmup.clone(),
            Arc::clone(&self.metrics),
        );
        Some(task.spawn(cancel))
    }
}
