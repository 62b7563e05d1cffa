//! 弹性模块：熔断器、限流器与重试策略。
//!
//! # Resilience Primitives Module
//!
//! Guards that sit between callers and a metered third-party service.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`circuit_breaker`] | CLOSED / OPEN / HALF_OPEN breaker, one per api type |
//! | [`registry`] | Lazily populated map of breakers with per-api overrides |
//! | [`rate_limiter`] | Sliding-window and token-bucket limits per api type and tier |
//! | [`retry`] | Retry eligibility and jittered exponential backoff per error kind |
//!
//! ## Circuit Breaker
//!
//! ```rust
//! use meterguard::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use meterguard::telemetry::noop_sink;
//! use meterguard::ApiType;
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new(ApiType::Routes, config, noop_sink());
//!
//! if let Some(permit) = breaker.can_execute() {
//!     // call the backend...
//!     breaker.record_success(permit);
//! }
//! ```
//!
//! ## Rate Limiter
//!
//! ```rust
//! use meterguard::resilience::rate_limiter::{RateLimitKey, RateLimitRule, RateLimiter, RateLimiterConfig};
//! use meterguard::telemetry::noop_sink;
//! use meterguard::{ApiType, Tier};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let config = RateLimiterConfig::new()
//!     .with_rule(ApiType::Geocoding, RateLimitRule::sliding_window(50, Duration::from_secs(1)));
//! let limiter = RateLimiter::new(config, noop_sink());
//!
//! let key = RateLimitKey::new(ApiType::Geocoding, Tier::Standard);
//! assert!(limiter.check(&key, 1).await.is_ok());
//! # });
//! ```

pub mod circuit_breaker;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState};
pub use rate_limiter::{
    RateLimitDecision, RateLimitKey, RateLimitRule, RateLimiter, RateLimiterConfig,
    RateLimiterSnapshot,
};
pub use registry::{CircuitBreakerRegistry, CircuitBreakerSettings};
pub use retry::{RetryConfig, RetryDecision, RetryPolicy};
