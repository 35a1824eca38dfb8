//! Token validity window. The window is a pure function of the clock; there
//! is no persisted or per-deal configuration.

use chrono::{DateTime, Duration, Utc};

pub const TOKEN_TTL_DAYS: i64 = 14;

/// Expiration timestamp for a token issued at `now`.
pub fn expiration_from(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(TOKEN_TTL_DAYS)
}

/// Strict check: a token expires the instant `now` passes `expires_at`.
pub fn is_expired(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now > expires_at
}
