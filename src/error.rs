use crate::error_kind::ErrorKind;
use crate::types::ApiType;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Structured error context for configuration and validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "cache.min_ttl_secs")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "config_loader", "memory_backend")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// The single typed error that crosses the guard boundary once classification
/// and retries are done. Carries enough to log and alert without re-deriving
/// the classification downstream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub kind: ErrorKind,
    pub status_code: Option<u16>,
    pub api_type: ApiType,
    pub endpoint: String,
    /// Unix epoch milliseconds of the final failed attempt.
    pub timestamp_ms: u64,
    /// Raw failure message or response body.
    pub message: String,
    pub attempts: u32,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] on {} {}", self.kind, self.kind.code(), self.api_type, self.endpoint)?;
        if let Some(status) = self.status_code {
            write!(f, " (HTTP {})", status)?;
        }
        write!(f, " after {} attempt(s): {}", self.attempts, self.message)
    }
}

impl std::error::Error for ApiError {}

/// Unified error type for the guard.
#[derive(Debug, Error)]
pub enum Error {
    #[error("API call failed: {0}")]
    Api(ApiError),

    #[error("Circuit open for {api_type} ({endpoint}); retry in {retry_after_ms}ms")]
    CircuitOpen {
        api_type: ApiType,
        endpoint: String,
        retry_after_ms: u64,
    },

    #[error("Rate limit exceeded for {key}: limit {limit}, remaining {remaining}, resets in {reset_after_ms}ms")]
    RateLimitExceeded {
        api_type: ApiType,
        key: String,
        limit: u64,
        remaining: u64,
        reset_after_ms: u64,
    },

    #[error("Call to {api_type} ({endpoint}) cancelled after {attempts} attempt(s)")]
    Cancelled {
        api_type: ApiType,
        endpoint: String,
        attempts: u32,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Cache error: {message}{}", format_context(.context))]
    Cache {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn cache_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Cache {
            message: msg.into(),
            context,
        }
    }

    /// Classification of a surfaced upstream failure, if this is one.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Error::Api(e) => Some(e),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        self.api_error().map(|e| e.kind)
    }

    /// `true` when the caller should try again later rather than fix the request.
    pub fn is_retry_later(&self) -> bool {
        match self {
            Error::CircuitOpen { .. } | Error::RateLimitExceeded { .. } => true,
            Error::Api(e) => e.retryable,
            _ => false,
        }
    }

    /// `true` when the failure was produced without invoking the underlying call.
    pub fn is_rejected_fast(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. } | Error::RateLimitExceeded { .. })
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Cache { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        Error::Api(e)
    }
}
