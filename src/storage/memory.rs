//! Process-local stores. Expiry is tracked with `tokio::time::Instant`, so tests
//! can drive it with a paused clock.

use super::{CounterStore, Fields, SessionStore, StorageError};
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::{sync::Mutex, time::Instant};

#[derive(Debug, Clone, Copy)]
struct CounterEntry {
    count: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: Mutex<HashMap<String, CounterEntry>>,
}

impl MemoryCounterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, StorageError> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;
        counters.retain(|_, entry| !entry.is_expired(now));

        let entry = counters.entry(key.to_string()).or_insert(CounterEntry {
            count: 0,
            expires_at: None,
        });
        entry.count += 1;
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StorageError> {
        let mut counters = self.counters.lock().await;
        if let Some(entry) = counters.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SessionEntry {
    fields: Fields,
    expires_at: Instant,
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn write_fields(
        &self,
        key: &str,
        fields: &Fields,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            key.to_string(),
            SessionEntry {
                fields: fields.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn read_fields(&self, key: &str) -> Result<Option<Fields>, StorageError> {
        let now = Instant::now();
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.fields.clone()))
    }

    async fn take_fields(&self, key: &str) -> Result<Option<Fields>, StorageError> {
        let now = Instant::now();
        let removed = self.sessions.lock().await.remove(key);
        Ok(removed
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.fields))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.sessions.lock().await.remove(key);
        Ok(())
    }
}
