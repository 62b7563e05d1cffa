use crate::cache::AdaptiveCache;
use crate::config::GuardConfig;
use crate::resilience::{CircuitBreakerRegistry, RateLimiter, RetryPolicy};
use crate::telemetry::MetricsSink;
use crate::types::{ApiType, CallFailure, RawResponse, Response};
use crate::Result;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::options::CallOptions;

/// Guarded entry point for calls to metered third-party services.
///
/// Each logical call goes through, in order: cache lookup, rate limiter,
/// circuit breaker, then the underlying call with classified retries. A
/// successful response closes the loop by updating the breaker and the cache.
///
/// `ApiGuard` is cheap to share behind an `Arc`; all state lives in its
/// components, each with its own per-key locking.
pub struct ApiGuard {
    pub(crate) config: GuardConfig,
    pub(crate) breakers: Arc<CircuitBreakerRegistry>,
    pub(crate) limiter: Arc<RateLimiter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) cache: Arc<AdaptiveCache>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

impl ApiGuard {
    /// Guard with default configuration and an in-memory cache.
    pub fn new() -> Result<Self> {
        crate::client::builder::ApiGuardBuilder::new().build()
    }

    pub fn builder() -> crate::client::builder::ApiGuardBuilder {
        crate::client::builder::ApiGuardBuilder::new()
    }

    /// Run `call` under the guard with default options.
    ///
    /// `call` is invoked once per attempt and must be safe to repeat.
    pub async fn execute<F, Fut>(
        &self,
        api_type: ApiType,
        endpoint: &str,
        params: &Value,
        call: F,
    ) -> Result<Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<RawResponse, CallFailure>>,
    {
        self.execute_with(api_type, endpoint, params, CallOptions::default(), call)
            .await
    }

    pub async fn execute_with<F, Fut>(
        &self,
        api_type: ApiType,
        endpoint: &str,
        params: &Value,
        options: CallOptions,
        call: F,
    ) -> Result<Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<RawResponse, CallFailure>>,
    {
        if !options.bypass_cache {
            if let Some(hit) = self.cached(api_type, params).await {
                self.count_call(api_type, "cached");
                return Ok(hit);
            }
        }
        self.run_guarded(api_type, endpoint, params, &options, call)
            .await
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AdaptiveCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn circuit_breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }
}
