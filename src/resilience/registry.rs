//! Explicit owner of the per-api-type circuit breakers.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot};
use crate::telemetry::MetricsSink;
use crate::types::ApiType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

/// Breaker defaults plus per-api-type overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub defaults: CircuitBreakerConfig,
    pub overrides: BTreeMap<ApiType, CircuitBreakerConfig>,
}

impl CircuitBreakerSettings {
    pub fn config_for(&self, api_type: ApiType) -> &CircuitBreakerConfig {
        self.overrides.get(&api_type).unwrap_or(&self.defaults)
    }
}

/// Breakers are created lazily, one per api type, and live as long as the registry.
/// Creation takes the write lock only briefly; lookups after that share a read lock.
pub struct CircuitBreakerRegistry {
    settings: CircuitBreakerSettings,
    breakers: RwLock<HashMap<ApiType, Arc<CircuitBreaker>>>,
    metrics: Arc<dyn MetricsSink>,
}

impl CircuitBreakerRegistry {
    pub fn new(settings: CircuitBreakerSettings, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            settings,
            breakers: RwLock::new(HashMap::new()),
            metrics,
        }
    }

    pub fn get(&self, api_type: ApiType) -> Arc<CircuitBreaker> {
        {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(b) = breakers.get(&api_type) {
                return Arc::clone(b);
            }
        }
        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(api_type).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                api_type,
                self.settings.config_for(api_type).clone(),
                Arc::clone(&self.metrics),
            ))
        }))
    }

    /// Snapshot without creating a breaker that was never used.
    pub fn snapshot(&self, api_type: ApiType) -> Option<CircuitBreakerSnapshot> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        breakers.get(&api_type).map(|b| b.snapshot())
    }

    pub fn snapshots(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
        let mut out: Vec<_> = breakers.values().map(|b| b.snapshot()).collect();
        out.sort_by_key(|s| s.api_type);
        out
    }

    /// Returns `false` when no breaker exists yet for `api_type`.
    pub fn reset(&self, api_type: ApiType) -> bool {
        let breaker = {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            breakers.get(&api_type).cloned()
        };
        match breaker {
            Some(b) => {
                b.reset();
                true
            }
            None => false,
        }
    }

    /// Returns how many breakers were reset.
    pub fn reset_all(&self) -> usize {
        let all: Vec<_> = {
            let breakers = self.breakers.read().unwrap_or_else(PoisonError::into_inner);
            breakers.values().cloned().collect()
        };
        for b in &all {
            b.reset();
        }
        all.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::CircuitState;
    use crate::telemetry::noop_sink;

    #[test]
    fn same_instance_per_api_type() {
        let reg = CircuitBreakerRegistry::new(CircuitBreakerSettings::default(), noop_sink());
        let a = reg.get(ApiType::Routes);
        let b = reg.get(ApiType::Routes);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &reg.get(ApiType::Places)));
    }

    #[test]
    fn overrides_apply_per_api_type() {
        let mut settings = CircuitBreakerSettings::default();
        settings.overrides.insert(
            ApiType::MlInference,
            CircuitBreakerConfig::new().with_failure_threshold(2),
        );
        let reg = CircuitBreakerRegistry::new(settings, noop_sink());
        assert_eq!(reg.get(ApiType::MlInference).config().failure_threshold, 2);
        assert_eq!(reg.get(ApiType::Geocoding).config().failure_threshold, 5);
    }

    #[test]
    fn snapshot_does_not_create() {
        let reg = CircuitBreakerRegistry::new(CircuitBreakerSettings::default(), noop_sink());
        assert!(reg.snapshot(ApiType::Routes).is_none());
        assert!(!reg.reset(ApiType::Routes));
        reg.get(ApiType::Routes);
        assert!(reg.snapshot(ApiType::Routes).is_some());
    }

    #[test]
    fn reset_all_closes_every_breaker() {
        let mut settings = CircuitBreakerSettings::default();
        settings.defaults = CircuitBreakerConfig::new().with_failure_threshold(1);
        let reg = CircuitBreakerRegistry::new(settings, noop_sink());
        for api in [ApiType::Routes, ApiType::Places] {
            let cb = reg.get(api);
            let permit = cb.can_execute().unwrap();
            assert_eq!(cb.record_failure(permit), CircuitState::Open);
        }
        assert_eq!(reg.reset_all(), 2);
        assert!(reg
            .snapshots()
            .iter()
            .all(|s| s.state == CircuitState::Closed));
    }
}
