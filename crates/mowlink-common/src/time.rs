// ============================================
// File: crates/mowlink-common/src/time.rs
// ============================================
//! # Time Utilities
//!
//! ## Creation Reason
//! Token expiry, device-state freshness and request signing all need
//! wall-clock time in slightly different shapes. This module keeps those
//! shapes in one place.
//!
//! ## Main Functionality
//! - `Timestamp`: Unix time in milliseconds, ordered and serializable
//! - `http_date()`: RFC 1123 date header value (always GMT)
//! - `signing_timestamp()`: fractional seconds with 7 decimals
//!
//! ## ⚠️ Important Note for Next Developer
//! - The cloud gateway rejects dates that are not in GMT
//! - `signing_timestamp()` precision is part of the signed payload; do not
//!   change the number of decimals
//!
//! ## Last Modified
//! v0.1.0 - Initial time utilities

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================
// Timestamp
// ============================================

/// Unix timestamp in milliseconds.
///
/// # Example
/// ```
/// use mowlink_common::time::Timestamp;
/// use std::time::Duration;
///
/// let issued = Timestamp::from_secs(1_700_000_000);
/// let expires = issued.saturating_add(Duration::from_secs(3600));
/// assert_eq!(expires.as_secs(), 1_700_003_600);
/// assert!(issued < expires);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Epoch (used as the "never updated" value).
    pub const ZERO: Self = Self(0);

    /// Creates a timestamp from Unix milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from Unix seconds.
    #[must_use]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1000))
    }

    /// Creates a timestamp for the current time.
    #[must_use]
    pub fn now() -> Self {
        Self(unix_timestamp_millis())
    }

    /// Returns the Unix timestamp in milliseconds.
    #[must_use]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the Unix timestamp in whole seconds.
    #[must_use]
    pub const fn as_secs(&self) -> i64 {
        self.0 / 1000
    }

    /// Returns this timestamp shifted forward by `duration`.
    #[must_use]
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Returns this timestamp shifted backward by `duration`.
    #[must_use]
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }

    /// Returns `true` if `self` lies before the current time.
    #[must_use]
    pub fn is_past(&self) -> bool {
        self.0 <= unix_timestamp_millis()
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// ============================================
// Utility Functions
// ============================================

/// Returns the current Unix timestamp in milliseconds.
#[must_use]
pub fn unix_timestamp_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Current time as an RFC 1123 `Date` header value.
#[must_use]
pub fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Current time as fractional Unix seconds with 7 decimals.
#[must_use]
pub fn signing_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    format!("{secs:.7}")
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_now() {
        let ts = Timestamp::now();
        // Sometime after 2020-01-01
        assert!(ts.as_secs() > 1_577_836_800);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::from_secs(100);
        assert_eq!(ts.saturating_add(Duration::from_millis(1500)).as_millis(), 101_500);
        assert_eq!(ts.saturating_sub(Duration::from_secs(40)).as_secs(), 60);
        assert_eq!(Timestamp::from_millis(i64::MAX).saturating_add(Duration::from_secs(1)).as_millis(), i64::MAX);
    }

    #[test]
    fn test_is_past() {
        assert!(Timestamp::from_secs(1).is_past());
        assert!(!Timestamp::now().saturating_add(Duration::from_secs(60)).is_past());
    }

    #[test]
    fn test_http_date_format() {
        let date = http_date();
        assert!(date.ends_with(" GMT"));
        // "Thu, 01 Jan 2026 00:00:00 GMT"
        assert_eq!(date.len(), 29);
        assert_eq!(&date[3..5], ", ");
    }

    #[test]
    fn test_signing_timestamp_precision() {
        let ts = signing_timestamp();
        let (_, fraction) = ts.split_once('.').unwrap();
        assert_eq!(fraction.len(), 7);
    }
}
