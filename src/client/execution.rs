//! 调用执行逻辑：缓存、限流、熔断与分类重试。
//!
//! Guarded execution loop.

use crate::error::ApiError;
use crate::error_kind::ErrorKind;
use crate::resilience::{CallPermit, CircuitBreaker, CircuitState, RetryDecision};
use crate::telemetry::names;
use crate::types::{ApiType, CallFailure, RawResponse, Response};
use crate::utils::unix_millis;
use crate::{Error, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::core::ApiGuard;
use super::error_classification::{classify, classify_response};
use super::options::CallOptions;

/// Result of one attempt at the underlying call.
enum Attempt {
    Done(std::result::Result<RawResponse, CallFailure>),
    Cancelled,
}

/// A classified failed attempt.
struct Failure {
    kind: ErrorKind,
    status_code: Option<u16>,
    message: String,
    retry_after: Option<Duration>,
}

impl ApiGuard {
    /// Cache lookup on the request path. Backend errors read as misses.
    pub(crate) async fn cached(&self, api_type: ApiType, params: &Value) -> Option<Response> {
        match self.cache.get(api_type, params).await {
            Ok(Some(hit)) => {
                debug!(api_type = %api_type, "Cache hit");
                Some(hit)
            }
            Ok(None) => {
                debug!(api_type = %api_type, "Cache miss");
                None
            }
            Err(e) => {
                warn!(api_type = %api_type, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    pub(crate) fn count_call(&self, api_type: ApiType, outcome: &'static str) {
        self.metrics.increment_counter(
            names::CALLS_TOTAL,
            1,
            &[("api_type", api_type.as_str()), ("outcome", outcome)],
        );
    }

    async fn store(&self, api_type: ApiType, params: &Value, response: &Response, options: &CallOptions) {
        if let Err(e) = self
            .cache
            .set(api_type, params, response, options.force_ttl)
            .await
        {
            warn!(api_type = %api_type, error = %e, "Cache write failed");
        }
    }

    fn cancelled(&self, api_type: ApiType, endpoint: &str, attempts: u32) -> Error {
        self.count_call(api_type, "cancelled");
        debug!(api_type = %api_type, endpoint, attempts, "Call cancelled");
        Error::Cancelled {
            api_type,
            endpoint: endpoint.to_string(),
            attempts,
        }
    }

    async fn attempt<F, Fut>(&self, call: &mut F, options: &CallOptions) -> Attempt
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<RawResponse, CallFailure>>,
    {
        let fut = call();
        let bounded = async {
            match options.deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, fut)
                    .await
                    .unwrap_or_else(|elapsed| Err(CallFailure::from(elapsed))),
                None => fut.await,
            }
        };
        tokio::select! {
            biased;
            _ = options.cancel.cancelled() => Attempt::Cancelled,
            r = bounded => Attempt::Done(r),
        }
    }

    /// Everything after the cache lookup: limiter, breaker, attempts and retries.
    pub(crate) async fn run_guarded<F, Fut>(
        &self,
        api_type: ApiType,
        endpoint: &str,
        params: &Value,
        options: &CallOptions,
        mut call: F,
    ) -> Result<Response>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<RawResponse, CallFailure>>,
    {
        let key = options.rate_limit_key(api_type);
        let labels = [("api_type", api_type.as_str())];
        let mut breaker: Option<(Arc<CircuitBreaker>, CallPermit)> = None;
        let mut attempts: u32 = 0;

        loop {
            if options.cancel.is_cancelled() || options.past_deadline(Instant::now()) {
                if let Some((b, permit)) = &breaker {
                    b.release(*permit);
                }
                return Err(self.cancelled(api_type, endpoint, attempts));
            }

            if let Err(e) = self.limiter.check(&key, 1).await {
                if let Some((b, permit)) = &breaker {
                    b.release(*permit);
                }
                self.count_call(api_type, "rejected");
                return Err(e);
            }

            let (cb, permit) = match &breaker {
                Some((b, permit)) => (Arc::clone(b), *permit),
                None => {
                    let b = self.breakers.get(api_type);
                    let Some(permit) = b.can_execute() else {
                        self.metrics
                            .increment_counter(names::CIRCUIT_REJECTIONS_TOTAL, 1, &labels);
                        self.count_call(api_type, "rejected");
                        let retry_after_ms = b
                            .retry_after()
                            .map(|d| d.as_millis() as u64)
                            .unwrap_or(0);
                        return Err(Error::CircuitOpen {
                            api_type,
                            endpoint: endpoint.to_string(),
                            retry_after_ms,
                        });
                    };
                    breaker = Some((Arc::clone(&b), permit));
                    (b, permit)
                }
            };

            attempts += 1;
            let failure = match self.attempt(&mut call, options).await {
                Attempt::Cancelled => {
                    cb.release(permit);
                    return Err(self.cancelled(api_type, endpoint, attempts));
                }
                Attempt::Done(Ok(raw)) => match classify_response(&raw) {
                    None => {
                        cb.record_success(permit);
                        let response = Response::from(raw);
                        self.store(api_type, params, &response, options).await;
                        self.count_call(api_type, "ok");
                        return Ok(response);
                    }
                    Some(kind) => Failure {
                        kind,
                        status_code: Some(raw.status_code),
                        message: raw.body_text(),
                        retry_after: raw.retry_after,
                    },
                },
                Attempt::Done(Err(f)) => Failure {
                    kind: classify(None, Some(&f), None),
                    status_code: None,
                    message: f.to_string(),
                    retry_after: None,
                },
            };

            self.metrics.increment_counter(
                names::ERRORS_TOTAL,
                1,
                &[("api_type", api_type.as_str()), ("kind", failure.kind.name())],
            );
            let state = cb.record_failure(permit);

            let delay = match self.retry.decide(failure.kind, attempts, failure.retry_after) {
                RetryDecision::Retry { delay } if state != CircuitState::Open => {
                    // A wake-up time that overflows never fits a deadline.
                    let fits = match options.deadline {
                        Some(d) => Instant::now().checked_add(delay).is_some_and(|at| at < d),
                        None => true,
                    };
                    fits.then_some(delay)
                }
                _ => None,
            };

            let Some(delay) = delay else {
                return Err(self.surface(api_type, endpoint, attempts, failure));
            };

            warn!(
                api_type = %api_type,
                endpoint,
                kind = failure.kind.name(),
                status = ?failure.status_code,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                "Retrying failed call"
            );
            self.metrics.increment_counter(
                names::RETRIES_TOTAL,
                1,
                &[("api_type", api_type.as_str()), ("kind", failure.kind.name())],
            );

            tokio::select! {
                biased;
                _ = options.cancel.cancelled() => {
                    cb.release(permit);
                    return Err(self.cancelled(api_type, endpoint, attempts));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn surface(&self, api_type: ApiType, endpoint: &str, attempts: u32, failure: Failure) -> Error {
        let retryable = crate::resilience::retry::should_retry(failure.kind);
        info!(
            api_type = %api_type,
            endpoint,
            kind = failure.kind.name(),
            code = failure.kind.code(),
            status = ?failure.status_code,
            attempts,
            "Call failed"
        );
        self.count_call(api_type, "error");
        Error::Api(ApiError {
            kind: failure.kind,
            status_code: failure.status_code,
            api_type,
            endpoint: endpoint.to_string(),
            timestamp_ms: unix_millis(),
            message: failure.message,
            attempts,
            retryable,
            retry_after_ms: failure.retry_after.map(|d| d.as_millis() as u64),
        })
    }
}
