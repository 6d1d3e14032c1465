//! In-process record store.
//!
//! Backs the engine in tests and in single-node embeddings that do not
//! want a database. One mutex serializes every operation, which is as
//! strong as the per-record atomicity the trait asks for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::RecordStore;
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::models::{NewOtpRecord, OtpRecord};

pub struct MemoryRecordStore {
    records: Mutex<Vec<OtpRecord>>,
    clock: Arc<dyn Clock>,
}

impl MemoryRecordStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use an injected clock for `created_at` stamps, so tests that
    /// steer time see consistent record timestamps.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            clock,
        }
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: NewOtpRecord) -> Result<OtpRecord, StoreError> {
        let record = OtpRecord {
            id: Uuid::new_v4(),
            function_name: record.function_name,
            user_key: record.user_key,
            password_hash: record.password_hash,
            client_token: record.client_token,
            expires_seconds: record.expires_seconds,
            failed_count: 0,
            max_attempts: record.max_attempts,
            authenticated_at: None,
            created_at: self.clock.now(),
        };
        let mut records = self.records.lock().await;
        records.push(record.clone());
        Ok(record)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<OtpRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records.iter().find(|record| record.id == id).cloned())
    }

    async fn most_recent(
        &self,
        function_name: &str,
        user_key: &str,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| {
                record.function_name == function_name && record.user_key == user_key
            })
            // Ties on created_at resolve to the latest insertion.
            .max_by_key(|record| record.created_at)
            .cloned())
    }

    async fn sum_failed_count_since(
        &self,
        user_key: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|record| {
                record.user_key == user_key
                    && record.created_at >= since
                    && record.authenticated_at.is_none()
            })
            .map(|record| i64::from(record.failed_count))
            .sum())
    }

    async fn set_client_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let stored = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::Missing(id))?;
        stored.client_token = token.map(str::to_string);
        Ok(())
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let stored = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::Missing(id))?;
        stored.failed_count += 1;
        Ok(())
    }

    async fn mark_authenticated(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let stored = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or(StoreError::Missing(id))?;
        stored.authenticated_at.get_or_insert(at);
        stored.client_token = None;
        Ok(())
    }
}
