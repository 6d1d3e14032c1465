//! Persistence seam for OTP records.
//!
//! The engine owns no state; everything mutable lives behind
//! [`RecordStore`]. Every mutation is a narrow per-record transition
//! touching a single field, and adapters must keep each one atomic:
//! that is where the concurrent-verify hazard is absorbed, not in the
//! engine.

mod memory;
mod postgres;

pub use memory::MemoryRecordStore;
pub use postgres::PgRecordStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{NewOtpRecord, OtpRecord};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record, assigning `id` and `created_at` and zeroing
    /// the counters.
    async fn insert(&self, record: NewOtpRecord) -> Result<OtpRecord, StoreError>;

    async fn fetch(&self, id: Uuid) -> Result<Option<OtpRecord>, StoreError>;

    /// Newest record for `(function_name, user_key)` by `created_at`.
    async fn most_recent(
        &self,
        function_name: &str,
        user_key: &str,
    ) -> Result<Option<OtpRecord>, StoreError>;

    /// Sum of `failed_count` over the user's records created at or after
    /// `since`, excluding records that already authenticated.
    async fn sum_failed_count_since(
        &self,
        user_key: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Overwrite `client_token` and nothing else; `failed_count` and
    /// `authenticated_at` stay out of reach, so a token write can never
    /// revert a verification transition landing on the same record.
    ///
    /// Fails with [`StoreError::Missing`] if the row is gone.
    async fn set_client_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError>;

    /// Atomically add one failed attempt to the record. In-place so
    /// concurrent failures cannot lose updates.
    async fn record_failed_attempt(&self, id: Uuid) -> Result<(), StoreError>;

    /// Set `authenticated_at` if it is still unset and clear the client
    /// token. The first success wins; later calls leave the timestamp
    /// alone.
    async fn mark_authenticated(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}
