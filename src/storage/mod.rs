//! Shared key/value state used across gateway instances.
//!
//! Two capabilities live here:
//! - [`CounterStore`]: atomic per-key counters with an expiry, used by the rate guard.
//! - [`SessionStore`]: small field maps with a TTL, used for challenge sessions.
//!
//! Both ship with a Postgres implementation (shared by every instance) and an
//! in-memory implementation for single-process deployments and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::{collections::BTreeMap, time::Duration};

pub use memory::{MemoryCounterStore, MemorySessionStore};
pub use postgres::{PgCounterStore, PgSessionStore};

/// Flat field map persisted by a [`SessionStore`].
pub type Fields = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("stored value is malformed: {0}")]
    Malformed(String),
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increments the counter under `key` and returns the new value.
    ///
    /// A missing or expired counter starts again at 1.
    ///
    /// # Errors
    /// Returns `StorageError` if the backend cannot be reached.
    async fn increment(&self, key: &str) -> Result<i64, StorageError>;

    /// Sets the counter to expire `ttl` from now.
    ///
    /// # Errors
    /// Returns `StorageError` if the backend cannot be reached.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StorageError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Writes all `fields` under `key` in one operation, replacing any previous value.
    ///
    /// # Errors
    /// Returns `StorageError` if the backend cannot be reached.
    async fn write_fields(&self, key: &str, fields: &Fields, ttl: Duration)
        -> Result<(), StorageError>;

    /// Reads the fields under `key`, `None` when absent or expired.
    ///
    /// # Errors
    /// Returns `StorageError` if the backend cannot be reached.
    async fn read_fields(&self, key: &str) -> Result<Option<Fields>, StorageError>;

    /// Removes `key` and returns its fields, `None` when absent or expired.
    ///
    /// Atomic: of several concurrent callers for one key, at most one gets the fields.
    ///
    /// # Errors
    /// Returns `StorageError` if the backend cannot be reached.
    async fn take_fields(&self, key: &str) -> Result<Option<Fields>, StorageError>;

    /// Removes `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    /// Returns `StorageError` if the backend cannot be reached.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Postgres interval literal for a duration, e.g. `"300 seconds"`.
pub(crate) fn interval_literal(ttl: Duration) -> String {
    format!("{} seconds", ttl.as_secs().max(1))
}
