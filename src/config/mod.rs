//! 配置模块：熔断、限流、重试、缓存与预热的统一配置。
//!
//! # Guard Configuration Module
//!
//! One serde document configures every guard component. Files are YAML;
//! durations are written as plain numbers in fields suffixed `_secs` or `_ms`.
//!
//! | Section | Type | Description |
//! |---------|------|-------------|
//! | `circuit_breaker` | [`CircuitBreakerSettings`] | Breaker defaults and per-api overrides |
//! | `rate_limits` | [`RateLimiterConfig`] | Per-api rules and tier multipliers |
//! | `retry` | [`RetryConfig`] | Backoff bounds and jitter |
//! | `cache` | [`CacheConfig`] | TTL bounds, overrides and limits |
//! | `warmup` | [`WarmupConfig`] | Background refresh of popular entries |
//!
//! ## Example
//!
//! ```rust
//! use meterguard::config::GuardConfig;
//!
//! let yaml = r#"
//! circuit_breaker:
//!   defaults:
//!     failure_threshold: 3
//!     timeout_secs: 30
//! rate_limits:
//!   per_api:
//!     places:
//!       algorithm: token_bucket
//!       capacity: 20
//!       refill_per_sec: 5
//! cache:
//!   ttl_overrides_secs:
//!     routes: 900
//! "#;
//! let config = GuardConfig::from_yaml_str(yaml).unwrap();
//! assert_eq!(config.circuit_breaker.defaults.failure_threshold, 3);
//! ```

pub mod durations;
mod loader;

pub use loader::CONFIG_ENV_VAR;

use crate::cache::{CacheConfig, WarmupConfig};
use crate::resilience::{CircuitBreakerConfig, CircuitBreakerSettings, RateLimitRule, RateLimiterConfig, RetryConfig};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    pub circuit_breaker: CircuitBreakerSettings,
    pub rate_limits: RateLimiterConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
    pub warmup: WarmupConfig,
}

/// Longest TTL a per-api override may configure: one year.
pub const MAX_TTL_OVERRIDE_SECS: u64 = 365 * 86_400;

fn invalid(field: impl Into<String>, details: impl Into<String>) -> Error {
    Error::configuration_with_context(
        "invalid configuration value",
        ErrorContext::new()
            .with_field_path(field)
            .with_details(details)
            .with_source("config_validator"),
    )
}

fn validate_breaker(path: &str, cfg: &CircuitBreakerConfig) -> Result<()> {
    if cfg.failure_threshold == 0 {
        return Err(invalid(format!("{}.failure_threshold", path), "must be at least 1"));
    }
    if cfg.success_threshold == 0 {
        return Err(invalid(format!("{}.success_threshold", path), "must be at least 1"));
    }
    if cfg.half_open_max_calls == 0 {
        return Err(invalid(format!("{}.half_open_max_calls", path), "must be at least 1"));
    }
    if cfg.timeout.is_zero() {
        return Err(invalid(format!("{}.timeout_secs", path), "must be positive"));
    }
    Ok(())
}

fn validate_rule(path: &str, rule: &RateLimitRule) -> Result<()> {
    match rule {
        RateLimitRule::SlidingWindow { limit, window } => {
            if *limit == 0 {
                return Err(invalid(format!("{}.limit", path), "must be at least 1"));
            }
            if window.is_zero() {
                return Err(invalid(format!("{}.window_secs", path), "must be positive"));
            }
        }
        RateLimitRule::TokenBucket {
            capacity,
            refill_per_sec,
        } => {
            if *capacity == 0 {
                return Err(invalid(format!("{}.capacity", path), "must be at least 1"));
            }
            if !refill_per_sec.is_finite() || *refill_per_sec <= 0.0 {
                return Err(invalid(format!("{}.refill_per_sec", path), "must be a positive number"));
            }
        }
    }
    Ok(())
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values that would make a component misbehave. The error's
    /// context carries the offending field path.
    pub fn validate(&self) -> Result<()> {
        validate_breaker("circuit_breaker.defaults", &self.circuit_breaker.defaults)?;
        for (api, cfg) in &self.circuit_breaker.overrides {
            validate_breaker(&format!("circuit_breaker.overrides.{}", api), cfg)?;
        }

        validate_rule("rate_limits.default_rule", &self.rate_limits.default_rule)?;
        for (api, rule) in &self.rate_limits.per_api {
            validate_rule(&format!("rate_limits.per_api.{}", api), rule)?;
        }
        for (tier, m) in &self.rate_limits.tier_multipliers {
            if !m.is_finite() || *m <= 0.0 {
                return Err(invalid(
                    format!("rate_limits.tier_multipliers.{}", tier),
                    format!("must be a positive number, got {}", m),
                ));
            }
        }

        if self.retry.min_delay > self.retry.max_delay {
            return Err(invalid("retry.min_delay_ms", "must not exceed retry.max_delay_ms"));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(invalid("retry.jitter_ratio", "must be within [0, 1]"));
        }

        let cache = &self.cache;
        if cache.min_ttl.is_zero() {
            return Err(invalid("cache.min_ttl_secs", "must be positive"));
        }
        if cache.min_ttl > cache.max_ttl {
            return Err(invalid("cache.min_ttl_secs", "must not exceed cache.max_ttl_secs"));
        }
        if cache.max_entry_size == 0 {
            return Err(invalid("cache.max_entry_size", "must be at least 1 byte"));
        }
        if cache.key_prefix.contains(|c| c == '*' || c == '?') {
            return Err(invalid("cache.key_prefix", "must not contain glob characters"));
        }
        for (api, secs) in &cache.ttl_overrides_secs {
            if *secs == 0 || *secs > MAX_TTL_OVERRIDE_SECS {
                return Err(invalid(
                    format!("cache.ttl_overrides_secs.{}", api),
                    format!("must be within 1..={}", MAX_TTL_OVERRIDE_SECS),
                ));
            }
        }
        if cache.scan_batch == 0 {
            return Err(invalid("cache.scan_batch", "must be at least 1"));
        }
        if cache.max_entries == 0 {
            return Err(invalid("cache.max_entries", "must be at least 1"));
        }

        if self.warmup.enabled {
            if self.warmup.interval.is_zero() {
                return Err(invalid("warmup.interval_secs", "must be positive when warm-up is enabled"));
            }
            if self.warmup.max_candidates == 0 {
                return Err(invalid("warmup.max_candidates", "must be at least 1"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ApiType, Tier};
    use std::time::Duration;

    fn field_of(err: Error) -> String {
        err.context()
            .and_then(|c| c.field_path.clone())
            .unwrap_or_default()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(GuardConfig::default().validate().is_ok());
    }

    #[test]
    fn full_document_parses() {
        let yaml = r#"
circuit_breaker:
  defaults:
    failure_threshold: 4
    success_threshold: 1
    timeout_secs: 12.5
  overrides:
    ml_inference:
      failure_threshold: 2
rate_limits:
  default_rule:
    algorithm: sliding_window
    limit: 100
    window_secs: 60
  per_api:
    places:
      algorithm: token_bucket
      capacity: 20
      refill_per_sec: 2.5
  tier_multipliers:
    premium: 3.0
retry:
  min_delay_ms: 50
  max_delay_ms: 5000
  jitter: false
cache:
  min_ttl_secs: 60
  max_ttl_secs: 3600
  key_prefix: prod
  ttl_overrides_secs:
    routes: 900
warmup:
  enabled: true
  interval_secs: 120
  access_threshold: 25
"#;
        let cfg = GuardConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.circuit_breaker.defaults.failure_threshold, 4);
        assert_eq!(cfg.circuit_breaker.defaults.timeout, Duration::from_millis(12_500));
        assert_eq!(cfg.circuit_breaker.config_for(ApiType::MlInference).failure_threshold, 2);
        assert_eq!(
            cfg.rate_limits.rule_for(ApiType::Places, Tier::Standard),
            RateLimitRule::token_bucket(20, 2.5)
        );
        assert_eq!(cfg.rate_limits.multiplier(Tier::Premium), 3.0);
        assert_eq!(cfg.retry.max_delay, Duration::from_secs(5));
        assert!(!cfg.retry.jitter);
        assert_eq!(cfg.cache.key_prefix, "prod");
        assert_eq!(cfg.cache.ttl_overrides_secs.get(&ApiType::Routes), Some(&900));
        assert_eq!(cfg.cache.max_entry_size, 1024 * 1024);
        assert_eq!(cfg.warmup.access_threshold, 25);
        assert_eq!(cfg.warmup.refresh_window, Duration::from_secs(600));
    }

    #[test]
    fn unknown_sections_are_rejected() {
        assert!(GuardConfig::from_yaml_str("caches: {}\n").is_err());
    }

    #[test]
    fn validation_reports_field_path() {
        let mut cfg = GuardConfig::default();
        cfg.cache.min_ttl = Duration::from_secs(90_000);
        assert_eq!(field_of(cfg.validate().unwrap_err()), "cache.min_ttl_secs");

        let mut cfg = GuardConfig::default();
        cfg.rate_limits
            .per_api
            .insert(ApiType::Routes, RateLimitRule::sliding_window(0, Duration::from_secs(1)));
        assert_eq!(
            field_of(cfg.validate().unwrap_err()),
            "rate_limits.per_api.routes.limit"
        );

        let mut cfg = GuardConfig::default();
        cfg.circuit_breaker
            .overrides
            .insert(ApiType::Places, CircuitBreakerConfig::new().with_failure_threshold(0));
        assert_eq!(
            field_of(cfg.validate().unwrap_err()),
            "circuit_breaker.overrides.places.failure_threshold"
        );
    }

    #[test]
    fn negative_durations_fail_to_parse() {
        let yaml = "circuit_breaker:\n  defaults:\n    timeout_secs: -1\n";
        assert!(GuardConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn oversized_durations_fail_to_parse() {
        for value in ["1e30", ".inf", ".nan"] {
            let yaml = format!("circuit_breaker:\n  defaults:\n    timeout_secs: {value}\n");
            assert!(
                matches!(GuardConfig::from_yaml_str(&yaml), Err(Error::Yaml(_))),
                "{value} should be rejected"
            );
        }
    }

    #[test]
    fn ttl_overrides_are_bounded() {
        let mut cfg = GuardConfig::default();
        cfg.cache.ttl_overrides_secs.insert(ApiType::Routes, u64::MAX);
        assert_eq!(
            field_of(cfg.validate().unwrap_err()),
            "cache.ttl_overrides_secs.routes"
        );
        cfg.cache
            .ttl_overrides_secs
            .insert(ApiType::Routes, MAX_TTL_OVERRIDE_SECS);
        assert!(cfg.validate().is_ok());
    }
}
