//! Request/response values exchanged with underlying calls and callers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Completed exchange with a third-party service, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status_code: u16,
    pub body: serde_json::Value,
    /// Explicit retry hint supplied by the backend (e.g. `Retry-After`).
    pub retry_after: Option<Duration>,
}

impl RawResponse {
    pub fn new(status_code: u16, body: serde_json::Value) -> Self {
        Self {
            status_code,
            body,
            retry_after: None,
        }
    }

    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Body rendered as text for substring classification.
    pub fn body_text(&self) -> String {
        match &self.body {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// An underlying call that never produced a status code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallFailure {
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("{0}")]
    Other(String),
}

impl CallFailure {
    pub fn message(&self) -> &str {
        match self {
            Self::Timeout(m) | Self::Network(m) | Self::Other(m) => m,
        }
    }
}

impl From<std::io::Error> for CallFailure {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            CallFailure::Timeout(e.to_string())
        } else {
            CallFailure::Network(e.to_string())
        }
    }
}

impl From<tokio::time::error::Elapsed> for CallFailure {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        CallFailure::Timeout(e.to_string())
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub cached: bool,
    pub fingerprint: String,
    pub cached_at_ms: u64,
    pub ttl_secs: u64,
    pub age_secs: u64,
    pub access_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status_code: u16,
    pub body: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheMetadata>,
}

impl Response {
    pub fn is_cached(&self) -> bool {
        self.cache.as_ref().map(|c| c.cached).unwrap_or(false)
    }
}

impl From<RawResponse> for Response {
    fn from(raw: RawResponse) -> Self {
        Self {
            status_code: raw.status_code,
            body: raw.body,
            cache: None,
        }
    }
}
