//! Closed failure taxonomy for outbound API calls.
//!
//! Every failure observed by the guard is reduced to exactly one [`ErrorKind`]
//! by [`crate::client::classify`]. Retry, breaker and reporting logic switch
//! over this enum and never re-inspect raw status codes or transport errors.
//!
//! ## Error Code Categories
//!
//! | Prefix | Category  | Description                          |
//! |--------|-----------|--------------------------------------|
//! | E1xxx  | client    | The request itself is wrong          |
//! | E2xxx  | rate      | Throughput or billing limits         |
//! | E3xxx  | server    | Provider-side faults                 |
//! | E4xxx  | transport | Network and deadline failures        |
//! | E9xxx  | unknown   | Unclassified, never retried          |
//!
//! ```rust
//! use meterguard::ErrorKind;
//!
//! let kind = ErrorKind::from_http_status(429).unwrap();
//! assert_eq!(kind.code(), "E2001");
//! assert_eq!(kind.category(), "rate");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// E1001: malformed request or invalid parameters
    InvalidRequest,
    /// E1002: missing, expired or rejected API key
    InvalidCredentials,
    /// E1003: credentials valid but not allowed
    PermissionDenied,
    /// E1004: resource does not exist
    NotFound,
    /// E2001: provider rate limit hit
    RateLimited,
    /// E2002: account quota or billing limit reached
    QuotaExceeded,
    /// E3001: provider temporarily unavailable (502/503/504)
    ServiceUnavailable,
    /// E3002: provider internal failure (other 5xx)
    InternalError,
    /// E4001: connection or I/O failure
    NetworkError,
    /// E4002: request timed out before a response arrived
    Timeout,
    /// E9999: could not be classified
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 11] = [
        Self::InvalidRequest,
        Self::InvalidCredentials,
        Self::PermissionDenied,
        Self::NotFound,
        Self::RateLimited,
        Self::QuotaExceeded,
        Self::ServiceUnavailable,
        Self::InternalError,
        Self::NetworkError,
        Self::Timeout,
        Self::Unknown,
    ];

    #[inline]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "E1001",
            Self::InvalidCredentials => "E1002",
            Self::PermissionDenied => "E1003",
            Self::NotFound => "E1004",
            Self::RateLimited => "E2001",
            Self::QuotaExceeded => "E2002",
            Self::ServiceUnavailable => "E3001",
            Self::InternalError => "E3002",
            Self::NetworkError => "E4001",
            Self::Timeout => "E4002",
            Self::Unknown => "E9999",
        }
    }

    /// Snake-case name used in logs and metric labels.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidCredentials => "invalid_credentials",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ServiceUnavailable => "service_unavailable",
            Self::InternalError => "internal_error",
            Self::NetworkError => "network_error",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Returns `"client"`, `"rate"`, `"server"`, `"transport"` or `"unknown"`.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidRequest
            | Self::InvalidCredentials
            | Self::PermissionDenied
            | Self::NotFound => "client",
            Self::RateLimited | Self::QuotaExceeded => "rate",
            Self::ServiceUnavailable | Self::InternalError => "server",
            Self::NetworkError | Self::Timeout => "transport",
            Self::Unknown => "unknown",
        }
    }

    /// Status-code table. Returns `None` for statuses the table does not cover
    /// so the classifier can fall through to its remaining rules.
    pub fn from_http_status(status: u16) -> Option<Self> {
        let kind = match status {
            400 => Self::InvalidRequest,
            401 => Self::InvalidCredentials,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            502..=504 => Self::ServiceUnavailable,
            500..=599 => Self::InternalError,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique() {
        let codes: HashSet<_> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn status_table() {
        assert_eq!(ErrorKind::from_http_status(400), Some(ErrorKind::InvalidRequest));
        assert_eq!(ErrorKind::from_http_status(401), Some(ErrorKind::InvalidCredentials));
        assert_eq!(ErrorKind::from_http_status(403), Some(ErrorKind::PermissionDenied));
        assert_eq!(ErrorKind::from_http_status(404), Some(ErrorKind::NotFound));
        assert_eq!(ErrorKind::from_http_status(429), Some(ErrorKind::RateLimited));
        assert_eq!(ErrorKind::from_http_status(500), Some(ErrorKind::InternalError));
        assert_eq!(ErrorKind::from_http_status(503), Some(ErrorKind::ServiceUnavailable));
        assert_eq!(ErrorKind::from_http_status(599), Some(ErrorKind::InternalError));
        assert_eq!(ErrorKind::from_http_status(418), None);
        assert_eq!(ErrorKind::from_http_status(200), None);
    }

    #[test]
    fn serde_uses_snake_case_names() {
        for kind in ErrorKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.name()));
        }
    }
}
