//! Replay protection for signed requests.
//!
//! `ReplayGuard` only checks that the signed `X-Date` lies inside a symmetric
//! tolerance window around server time. A captured request stays replayable
//! for the whole window; deployments that need single-use signatures enable
//! `SignatureReplayCache`, which remembers accepted signatures until their
//! timestamp leaves the window.

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use std::time::Duration;

use super::error::{AuthError, AuthErrorCode};

/// Default tolerance: 15 minutes.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(15 * 60);

/// Timestamp window validator.
#[derive(Debug, Clone, Copy)]
pub struct ReplayGuard {
    tolerance: TimeDelta,
}

impl ReplayGuard {
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance: TimeDelta::from_std(tolerance).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn tolerance(&self) -> TimeDelta {
        self.tolerance
    }

    /// Validate an RFC3339 timestamp against the current time.
    pub fn validate_timestamp(&self, timestamp: &str) -> Result<DateTime<Utc>, AuthError> {
        self.validate_timestamp_at(timestamp, Utc::now())
    }

    /// Validate an RFC3339 timestamp against `now`.
    ///
    /// Accepts `|now - ts| <= tolerance`; stale and future timestamps are
    /// rejected symmetrically. Returns the parsed timestamp.
    pub fn validate_timestamp_at(
        &self,
        timestamp: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, AuthError> {
        let ts = DateTime::parse_from_rfc3339(timestamp)
            .map_err(|e| {
                AuthError::new(
                    AuthErrorCode::InvalidTimestamp,
                    format!("invalid timestamp format: {}", e),
                )
            })?
            .with_timezone(&Utc);

        if (now - ts).abs() > self.tolerance {
            return Err(AuthError::new(
                AuthErrorCode::TimestampExpired,
                format!(
                    "request timestamp expired (tolerance {}s)",
                    self.tolerance.num_seconds()
                ),
            ));
        }

        Ok(ts)
    }
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

/// Remembers accepted `(access_key, signature)` pairs until they expire.
///
/// Entries map to the unix-millisecond instant after which the signed
/// timestamp is outside the tolerance window and the guard alone rejects it.
pub struct SignatureReplayCache {
    seen: DashMap<String, i64>,
}

impl SignatureReplayCache {
    pub fn new() -> Self {
        Self {
            seen: DashMap::new(),
        }
    }

    /// Record a signature. Returns `false` if it was already recorded and
    /// has not expired yet.
    pub fn check_and_record(
        &self,
        access_key: &str,
        signature: &str,
        expires_at_ms: i64,
        now_ms: i64,
    ) -> bool {
        let key = format!("{}:{}", access_key, signature);
        let mut entry = self.seen.entry(key).or_insert(i64::MIN);
        if *entry >= now_ms {
            return false;
        }
        *entry = expires_at_ms;
        true
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn sweep(&self, now_ms: i64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, expires_at| *expires_at >= now_ms);
        before.saturating_sub(self.seen.len())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

impl Default for SignatureReplayCache {
    fn default() -> Self {
        Self::new()
    }
}
