//! Retry eligibility and backoff per [`ErrorKind`].
//!
//! The policy only decides; sleeping and re-invoking happen in the guard's
//! execution loop so cancellation and breaker bookkeeping stay in one place.

use crate::config::durations::millis;
use crate::error_kind::ErrorKind;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Whether a failure of this kind is worth another attempt.
/// Unclassified failures are never retried.
pub fn should_retry(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Timeout
            | ErrorKind::NetworkError
            | ErrorKind::RateLimited
            | ErrorKind::ServiceUnavailable
            | ErrorKind::InternalError
    )
}

/// Total attempts allowed for a kind, the first one included.
pub fn max_attempts(kind: ErrorKind) -> u32 {
    match kind {
        ErrorKind::RateLimited | ErrorKind::ServiceUnavailable | ErrorKind::InternalError => 3,
        ErrorKind::NetworkError | ErrorKind::Timeout => 2,
        _ => 1,
    }
}

fn base_delay(kind: ErrorKind) -> Option<Duration> {
    let d = match kind {
        ErrorKind::RateLimited | ErrorKind::NetworkError => Duration::from_secs(1),
        ErrorKind::ServiceUnavailable | ErrorKind::InternalError | ErrorKind::Timeout => {
            Duration::from_secs(2)
        }
        _ => return None,
    };
    Some(d)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "min_delay_ms", with = "millis")]
    pub min_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    pub jitter: bool,
    /// Half-width of the uniform jitter band, as a fraction of the delay.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            jitter: true,
            jitter_ratio: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    pub fn with_bounds(mut self, min_delay: Duration, max_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self.max_delay = max_delay;
        self
    }
}

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    /// The kind is never retried.
    NotRetryable,
    /// The per-kind attempt cap has been reached.
    Exhausted,
}

#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn should_retry(&self, kind: ErrorKind) -> bool {
        should_retry(kind)
    }

    pub fn max_attempts(&self, kind: ErrorKind) -> u32 {
        max_attempts(kind)
    }

    /// Delay before retry number `attempt` (0-based: the first retry is 0).
    ///
    /// A backend-supplied `retry_after` is used verbatim. Otherwise the per-kind
    /// base doubles per attempt (Timeout stays flat), is clamped to
    /// `[min_delay, max_delay]`, then jittered.
    pub fn compute_delay(
        &self,
        kind: ErrorKind,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> Option<Duration> {
        let base = base_delay(kind)?;
        if let Some(hint) = retry_after {
            return Some(hint);
        }
        let exp = if kind == ErrorKind::Timeout {
            base
        } else {
            let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
            base.saturating_mul(factor)
        };
        let clamped = exp.clamp(self.config.min_delay, self.config.max_delay.max(self.config.min_delay));
        Some(self.jittered(clamped))
    }

    /// `attempts_made` counts the attempt that just failed.
    pub fn decide(
        &self,
        kind: ErrorKind,
        attempts_made: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        if !should_retry(kind) {
            return RetryDecision::NotRetryable;
        }
        if attempts_made >= max_attempts(kind) {
            return RetryDecision::Exhausted;
        }
        match self.compute_delay(kind, attempts_made.saturating_sub(1), retry_after) {
            Some(delay) => RetryDecision::Retry { delay },
            None => RetryDecision::NotRetryable,
        }
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let ratio = self.config.jitter_ratio.clamp(0.0, 1.0);
        if !self.config.jitter || ratio == 0.0 {
            return delay;
        }
        let factor = 1.0 - ratio + 2.0 * ratio * fastrand::f64();
        delay.mul_f64(factor)
    }
}
