//! `PostgreSQL` record store.
//!
//! Schema lives in `sql/schema.sql`. The transition operations push
//! their atomicity into SQL: the failed-attempt counter moves with an
//! in-place increment, `authenticated_at` is guarded by `COALESCE` and
//! the client token has its own single-column `UPDATE`, so concurrent
//! verifies against one record cannot lose or revert updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::RecordStore;
use crate::error::StoreError;
use crate::models::{NewOtpRecord, OtpRecord};

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert(&self, record: NewOtpRecord) -> Result<OtpRecord, StoreError> {
        let query = r"
            INSERT INTO otp_records
                (function_name, user_key, password_hash, client_token, expires_seconds, max_attempts)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let record = sqlx::query_as::<_, OtpRecord>(query)
            .bind(record.function_name)
            .bind(record.user_key)
            .bind(record.password_hash)
            .bind(record.client_token)
            .bind(record.expires_seconds)
            .bind(record.max_attempts)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(record)
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<OtpRecord>, StoreError> {
        let query = "SELECT * FROM otp_records WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let record = sqlx::query_as::<_, OtpRecord>(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(record)
    }

    async fn most_recent(
        &self,
        function_name: &str,
        user_key: &str,
    ) -> Result<Option<OtpRecord>, StoreError> {
        let query = r"
            SELECT * FROM otp_records
            WHERE function_name = $1
              AND user_key = $2
            ORDER BY created_at DESC
            LIMIT 1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let record = sqlx::query_as::<_, OtpRecord>(query)
            .bind(function_name)
            .bind(user_key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        Ok(record)
    }

    async fn sum_failed_count_since(
        &self,
        user_key: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let query = r"
            SELECT COALESCE(SUM(failed_count), 0)
            FROM otp_records
            WHERE user_key = $1
              AND created_at >= $2
              AND authenticated_at IS NULL
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_key)
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.get(0))
    }

    async fn set_client_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        let query = "UPDATE otp_records SET client_token = $2 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn record_failed_attempt(&self, id: Uuid) -> Result<(), StoreError> {
        let query = "UPDATE otp_records SET failed_count = failed_count + 1 WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }

    async fn mark_authenticated(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            UPDATE otp_records
            SET authenticated_at = COALESCE(authenticated_at, $2), client_token = NULL
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        Ok(())
    }
}
