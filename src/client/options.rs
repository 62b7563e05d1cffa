//! Per-call options for [`ApiGuard::execute_with`](super::ApiGuard::execute_with).

use crate::resilience::RateLimitKey;
use crate::types::{ApiType, Tier};
use crate::utils::instant_after;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub tier: Tier,
    /// Narrows the rate-limit key to one caller (user, tenant, key id).
    pub subject: Option<String>,
    /// Overrides the cache's TTL selection when the response is stored.
    pub force_ttl: Option<Duration>,
    /// Skip the cache lookup. A successful response is still stored.
    pub bypass_cache: bool,
    /// Aborts retry sleeps and in-flight attempts.
    pub cancel: CancellationToken,
    /// No attempt starts and no retry is scheduled past this instant.
    pub deadline: Option<Instant>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn force_ttl(mut self, ttl: Duration) -> Self {
        self.force_ttl = Some(ttl);
        self
    }

    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.bypass_cache = bypass;
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(self, budget: Duration) -> Self {
        self.deadline(instant_after(Instant::now(), budget))
    }

    pub(crate) fn rate_limit_key(&self, api_type: ApiType) -> RateLimitKey {
        let key = RateLimitKey::new(api_type, self.tier);
        match &self.subject {
            Some(s) => key.with_subject(s.clone()),
            None => key,
        }
    }

    pub(crate) fn past_deadline(&self, at: Instant) -> bool {
        self.deadline.map(|d| at >= d).unwrap_or(false)
    }
}
