use super::models::Identity;
use crate::storage::StorageError;
use async_trait::async_trait;
use sqlx::PgPool;
use std::{collections::HashMap, sync::RwLock};
use tracing::Instrument;
use uuid::Uuid;

/// Which column a lookup key is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityLookup {
    Phone,
    Username,
    /// The identity id, as carried in a token subject.
    Subject,
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// # Errors
    /// Returns `StorageError` when the store cannot answer. A missing identity is `Ok(None)`.
    async fn get(&self, key: &str, by: IdentityLookup) -> Result<Option<Identity>, StorageError>;
}

#[derive(Debug, Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn get(&self, key: &str, by: IdentityLookup) -> Result<Option<Identity>, StorageError> {
        let base = "SELECT id, username, phone, password_hash, state FROM users";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );

        let identity = match by {
            IdentityLookup::Subject => {
                let Ok(id) = Uuid::parse_str(key) else {
                    return Ok(None);
                };
                sqlx::query_as::<_, Identity>(&format!("{base} WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await?
            }
            IdentityLookup::Phone => {
                sqlx::query_as::<_, Identity>(&format!("{base} WHERE phone = $1"))
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await?
            }
            IdentityLookup::Username => {
                sqlx::query_as::<_, Identity>(&format!("{base} WHERE username = $1"))
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .instrument(span)
                    .await?
            }
        };

        Ok(identity)
    }
}

/// Identities held in process memory.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    identities: RwLock<HashMap<Uuid, Identity>>,
}

impl MemoryIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: Identity) {
        if let Ok(mut identities) = self.identities.write() {
            identities.insert(identity.id, identity);
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get(&self, key: &str, by: IdentityLookup) -> Result<Option<Identity>, StorageError> {
        let identities = self
            .identities
            .read()
            .map_err(|err| StorageError::Unavailable(err.to_string()))?;

        let found = identities.values().find(|identity| match by {
            IdentityLookup::Subject => identity.id.to_string() == key,
            IdentityLookup::Phone => identity.phone.as_deref() == Some(key),
            IdentityLookup::Username => identity.username == key,
        });

        Ok(found.cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::IdentityStatus;

    fn alice() -> Identity {
        Identity {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            phone: Some("13800138000".to_string()),
            password_hash: "digest".to_string(),
            status: IdentityStatus::Normal,
        }
    }

    #[tokio::test]
    async fn memory_store_lookups() -> Result<(), StorageError> {
        let store = MemoryIdentityStore::new();
        let alice = alice();
        store.insert(alice.clone());

        let by_name = store.get("alice", IdentityLookup::Username).await?;
        assert_eq!(by_name.map(|i| i.id), Some(alice.id));

        let by_phone = store.get("13800138000", IdentityLookup::Phone).await?;
        assert_eq!(by_phone.map(|i| i.id), Some(alice.id));

        let by_subject = store.get(&alice.subject(), IdentityLookup::Subject).await?;
        assert_eq!(by_subject.map(|i| i.username), Some("alice".to_string()));

        assert!(store.get("bob", IdentityLookup::Username).await?.is_none());
        assert!(store.get("alice", IdentityLookup::Phone).await?.is_none());
        Ok(())
    }
}
