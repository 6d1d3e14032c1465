//! Persisted OTP record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// One issued OTP. Mutable fields are `client_token`, `failed_count`,
/// and `authenticated_at`; everything else is fixed at creation.
///
/// Records are never deleted by the engine: a dead record (expired,
/// authenticated, or out of attempts) still feeds the rate-limit window.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct OtpRecord {
    pub id: Uuid,
    pub function_name: String,
    pub user_key: String,
    pub password_hash: String,
    pub client_token: Option<String>,
    /// Policy snapshot taken at creation; later policy edits do not read
    /// back into existing records.
    pub expires_seconds: i64,
    pub failed_count: i32,
    /// Policy snapshot taken at creation.
    pub max_attempts: i32,
    pub authenticated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OtpRecord {
    /// Last instant at which the record is still verifiable.
    ///
    /// Saturates to the far future if the TTL overflows the calendar, so
    /// an oversized policy reads as "never expires" rather than wrapping.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        chrono::Duration::try_seconds(self.expires_seconds)
            .and_then(|ttl| self.created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// False exactly on the closed interval `[created_at, expires_at]`;
    /// both boundary instants still verify. A `now` before `created_at`
    /// is outside the interval and therefore expired.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !(self.created_at <= now && now <= self.expires_at())
    }

    /// Strict comparison: a record with `failed_count == max_attempts`
    /// is out of attempts.
    #[must_use]
    pub fn is_under_attempt_limit(&self) -> bool {
        self.failed_count < self.max_attempts
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.authenticated_at.is_some()
    }
}

/// Insert payload for [`crate::store::RecordStore::insert`]. The store
/// assigns `id` and `created_at` and zero-initializes the counters.
#[derive(Debug, Clone)]
pub struct NewOtpRecord {
    pub function_name: String,
    pub user_key: String,
    pub password_hash: String,
    pub client_token: Option<String>,
    pub expires_seconds: i64,
    pub max_attempts: i32,
}

/// Opaque reference to one OTP record, returned by issuance and lookup
/// and threaded through verification calls. Holding a handle pins the
/// conversation to one record even when newer records exist for the same
/// user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OtpHandle(Uuid);

impl OtpHandle {
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for OtpHandle {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for OtpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::OtpRecord;
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    fn record(created_at: DateTime<Utc>, expires_seconds: i64) -> OtpRecord {
        OtpRecord {
            id: Uuid::new_v4(),
            function_name: "sign_in".to_string(),
            user_key: "user@example.com".to_string(),
            password_hash: "digest".to_string(),
            client_token: Some("token".to_string()),
            expires_seconds,
            failed_count: 0,
            max_attempts: 5,
            authenticated_at: None,
            created_at,
        }
    }

    #[test]
    fn expiry_interval_is_closed_on_both_ends() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let record = record(created, 30 * 60);

        assert!(!record.is_expired(created));
        assert!(!record.is_expired(created + chrono::Duration::minutes(30)));
        assert!(record.is_expired(created + chrono::Duration::minutes(30) + chrono::Duration::seconds(1)));
    }

    #[test]
    fn instant_before_creation_counts_as_expired() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let record = record(created, 30 * 60);
        assert!(record.is_expired(created - chrono::Duration::seconds(1)));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_wrapping() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let record = record(created, i64::MAX);
        assert_eq!(record.expires_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!record.is_expired(created + chrono::Duration::days(365_000)));
    }

    #[test]
    fn attempt_limit_is_strict() {
        let created = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let mut record = record(created, 30 * 60);

        record.failed_count = 4;
        assert!(record.is_under_attempt_limit());
        record.failed_count = 5;
        assert!(!record.is_under_attempt_limit());
    }
}
