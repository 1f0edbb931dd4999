//! Postgres-backed stores shared by every gateway instance.
//!
//! Counters live in `attempt_counters`, sessions in `session_fields` (see
//! `sql/schema.sql`). Expired rows are invisible to reads and are purged by
//! [`spawn_expiry_sweeper`].

use super::{interval_literal, CounterStore, Fields, SessionStore, StorageError};
use async_trait::async_trait;
use sqlx::{types::Json, PgPool, Row};
use std::time::Duration;
use tracing::{debug, error, Instrument};

// A counter past its expiry restarts at 1 and loses the stale expiry in the same statement.
const INCREMENT_QUERY: &str = r"
    INSERT INTO attempt_counters (key, count, expires_at)
    VALUES ($1, 1, NULL)
    ON CONFLICT (key) DO UPDATE SET
        count = CASE
            WHEN attempt_counters.expires_at IS NOT NULL AND attempt_counters.expires_at <= NOW() THEN 1
            ELSE attempt_counters.count + 1
        END,
        expires_at = CASE
            WHEN attempt_counters.expires_at IS NOT NULL AND attempt_counters.expires_at <= NOW() THEN NULL
            ELSE attempt_counters.expires_at
        END
    RETURNING count
";

#[derive(Debug, Clone)]
pub struct PgCounterStore {
    pool: PgPool,
}

impl PgCounterStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CounterStore for PgCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, StorageError> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT"
        );
        let row = sqlx::query(INCREMENT_QUERY)
            .bind(key)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.try_get("count")?)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StorageError> {
        let query = "UPDATE attempt_counters SET expires_at = NOW() + $2::interval WHERE key = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(key)
            .bind(interval_literal(ttl))
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn write_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let query = r"
            INSERT INTO session_fields (key, fields, expires_at)
            VALUES ($1, $2, NOW() + $3::interval)
            ON CONFLICT (key) DO UPDATE SET
                fields = EXCLUDED.fields,
                expires_at = EXCLUDED.expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT"
        );
        sqlx::query(query)
            .bind(key)
            .bind(Json(fields))
            .bind(interval_literal(ttl))
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn read_fields(&self, key: &str) -> Result<Option<Fields>, StorageError> {
        let query = "SELECT fields FROM session_fields WHERE key = $1 AND expires_at > NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.map(|row| {
            row.try_get::<Json<Fields>, _>("fields")
                .map(|Json(fields)| fields)
                .map_err(|err| StorageError::Malformed(err.to_string()))
        })
        .transpose()
    }

    async fn take_fields(&self, key: &str) -> Result<Option<Fields>, StorageError> {
        let query = r"
            DELETE FROM session_fields
            WHERE key = $1 AND expires_at > NOW()
            RETURNING fields
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE"
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;

        row.map(|row| {
            row.try_get::<Json<Fields>, _>("fields")
                .map(|Json(fields)| fields)
                .map_err(|err| StorageError::Malformed(err.to_string()))
        })
        .transpose()
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let query = "DELETE FROM session_fields WHERE key = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE"
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }
}

/// Deletes expired counters and sessions.
///
/// # Errors
/// Returns `StorageError` if either delete fails.
pub async fn purge_expired(pool: &PgPool) -> Result<u64, StorageError> {
    let mut purged = 0;
    for query in [
        "DELETE FROM attempt_counters WHERE expires_at IS NOT NULL AND expires_at <= NOW()",
        "DELETE FROM session_fields WHERE expires_at <= NOW()",
    ] {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE"
        );
        purged += sqlx::query(query)
            .execute(pool)
            .instrument(span)
            .await?
            .rows_affected();
    }
    Ok(purged)
}

/// Background task that periodically purges expired rows.
pub fn spawn_expiry_sweeper(pool: PgPool, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match purge_expired(&pool).await {
                Ok(0) => {}
                Ok(purged) => debug!("Purged {purged} expired counters/sessions"),
                Err(err) => error!("Failed to purge expired counters/sessions: {err}"),
            }
        }
    })
}
