//! Token expiry policy.
//!
//! Expiry instants are epoch milliseconds, with `0` meaning "no known
//! expiry". The predicates here are pure so they can be shared by the
//! credential store and by any refresh scheduling done by callers.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use tracing::warn;

/// Window used to decide that a token should be refreshed (24 hours).
pub const DEFAULT_EXPIRING_WINDOW: Duration = Duration::hours(24);

/// Validity assumed when the backend sends an expiry we cannot parse.
const FALLBACK_VALIDITY_DAYS: i64 = 7;

/// Returns true once `now` has passed a known expiry.
pub fn is_expired(expires_at: i64, now: i64) -> bool {
    expires_at != 0 && now > expires_at
}

/// Returns true when a known expiry is closer than `window`.
///
/// Already expired tokens count as expiring soon.
pub fn is_expiring_soon(expires_at: i64, now: i64, window: Duration) -> bool {
    expires_at != 0 && expires_at.saturating_sub(now) < window.num_milliseconds()
}

/// Convert the backend's `expires_at` string into epoch millis.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DDTHH:MM:SS[.fff]` (read as UTC).
/// Anything else yields `now + 7 days` so a login never ends up with an
/// immediately expired record.
pub fn parse_expiry(text: &str, now: i64) -> i64 {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return dt.timestamp_millis();
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Utc.from_utc_datetime(&naive).timestamp_millis();
    }
    warn!(value = %text, "Unparseable token expiry, assuming {} days", FALLBACK_VALIDITY_DAYS);
    fallback_expiry(now)
}

/// Expiry assumed when the backend sends none or one that can't be read.
pub fn fallback_expiry(now: i64) -> i64 {
    now.saturating_add(Duration::days(FALLBACK_VALIDITY_DAYS).num_milliseconds())
}

/// Source of wall-clock time for liveness checks.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
