//! Error classification logic

use crate::error_kind::ErrorKind;
use crate::types::{CallFailure, RawResponse};

/// Body phrases checked case-insensitively, first match wins.
const BODY_PATTERNS: &[(&str, ErrorKind)] = &[
    ("quota", ErrorKind::QuotaExceeded),
    ("rate limit", ErrorKind::RateLimited),
    ("permission", ErrorKind::PermissionDenied),
    ("invalid key", ErrorKind::InvalidCredentials),
];

/// Map a failed attempt onto an [`ErrorKind`].
///
/// Rules apply in order: status-code table, failure type, body text, then
/// [`ErrorKind::Unknown`]. When there is no body, an unrecognised failure's
/// message is scanned instead.
pub fn classify(
    status_code: Option<u16>,
    failure: Option<&CallFailure>,
    body: Option<&str>,
) -> ErrorKind {
    if let Some(kind) = status_code.and_then(ErrorKind::from_http_status) {
        return kind;
    }
    match failure {
        Some(CallFailure::Timeout(_)) => return ErrorKind::Timeout,
        Some(CallFailure::Network(_)) => return ErrorKind::NetworkError,
        _ => {}
    }
    let text = body.or_else(|| failure.map(CallFailure::message));
    text.and_then(scan_body).unwrap_or(ErrorKind::Unknown)
}

/// `None` for a 2xx exchange; otherwise the kind of failure it represents.
pub fn classify_response(response: &RawResponse) -> Option<ErrorKind> {
    if response.is_success() {
        return None;
    }
    let body = response.body_text();
    Some(classify(Some(response.status_code), None, Some(&body)))
}

fn scan_body(body: &str) -> Option<ErrorKind> {
    let lower = body.to_lowercase();
    BODY_PATTERNS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, kind)| *kind)
}
