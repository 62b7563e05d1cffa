//! Small shared helpers.

pub mod glob;

use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// Roughly thirty years; reads as "never" without overflowing `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, saturating at [`FAR_FUTURE`] when the sum does not fit.
pub(crate) fn instant_after(now: Instant, after: Duration) -> Instant {
    now.checked_add(after)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Wall-clock milliseconds since the Unix epoch, for reporting only.
/// Expiry and window arithmetic use the monotonic tokio clock.
pub(crate) fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
