//! Named predicates that rules can call, e.g. `isPrivileged(sub)`.

use crate::storage::StorageError;
use async_trait::async_trait;
use sqlx::PgPool;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::{sync::Mutex, time::Instant};
use tracing::{debug, Instrument};
use uuid::Uuid;

pub const IS_PRIVILEGED: &str = "isPrivileged";

#[derive(Debug, thiserror::Error)]
#[error("predicate lookup failed: {0}")]
pub struct PredicateError(pub String);

impl From<StorageError> for PredicateError {
    fn from(err: StorageError) -> Self {
        Self(err.to_string())
    }
}

#[async_trait]
pub trait Predicate: Send + Sync {
    /// # Errors
    /// Returns `PredicateError` when the data behind the predicate is unavailable.
    async fn evaluate(&self, arg: &str) -> Result<bool, PredicateError>;
}

/// Remembers answers of another predicate for `ttl`. Failures are not remembered.
pub struct CachedPredicate<P> {
    inner: P,
    ttl: Duration,
    answers: Mutex<HashMap<String, (bool, Instant)>>,
}

impl<P: Predicate> CachedPredicate<P> {
    pub fn new(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            answers: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<P: Predicate> Predicate for CachedPredicate<P> {
    async fn evaluate(&self, arg: &str) -> Result<bool, PredicateError> {
        let now = Instant::now();
        {
            let mut answers = self.answers.lock().await;
            answers.retain(|_, (_, cached_at)| now.duration_since(*cached_at) < self.ttl);
            if let Some((answer, _)) = answers.get(arg) {
                return Ok(*answer);
            }
        }

        let answer = self.inner.evaluate(arg).await?;
        self.answers
            .lock()
            .await
            .insert(arg.to_string(), (answer, Instant::now()));
        Ok(answer)
    }
}

#[async_trait]
pub trait PrivilegeLookup: Send + Sync {
    /// # Errors
    /// Returns `StorageError` when the store cannot answer.
    async fn is_privileged(&self, subject: &str) -> Result<bool, StorageError>;
}

/// `isPrivileged(sub)`: the subject is listed as a privileged user.
pub struct PrivilegedPredicate {
    lookup: Arc<dyn PrivilegeLookup>,
}

impl PrivilegedPredicate {
    #[must_use]
    pub fn new(lookup: Arc<dyn PrivilegeLookup>) -> Self {
        Self { lookup }
    }
}

#[async_trait]
impl Predicate for PrivilegedPredicate {
    async fn evaluate(&self, arg: &str) -> Result<bool, PredicateError> {
        let privileged = self.lookup.is_privileged(arg).await?;
        debug!("isPrivileged({arg}) = {privileged}");
        Ok(privileged)
    }
}

#[derive(Debug, Clone)]
pub struct PgPrivilegeLookup {
    pool: PgPool,
}

impl PgPrivilegeLookup {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrivilegeLookup for PgPrivilegeLookup {
    async fn is_privileged(&self, subject: &str) -> Result<bool, StorageError> {
        let Ok(user_id) = Uuid::parse_str(subject) else {
            return Ok(false);
        };
        let query = "SELECT EXISTS (SELECT 1 FROM privileged_users WHERE user_id = $1)";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let privileged: bool = sqlx::query_scalar(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(privileged)
    }
}

/// Fixed set of privileged subjects.
#[derive(Debug, Clone, Default)]
pub struct StaticPrivileges {
    subjects: HashSet<String>,
}

impl StaticPrivileges {
    pub fn new<I, S>(subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl PrivilegeLookup for StaticPrivileges {
    async fn is_privileged(&self, subject: &str) -> Result<bool, StorageError> {
        Ok(self.subjects.contains(subject))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingLookup {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Predicate for Arc<CountingLookup> {
        async fn evaluate(&self, arg: &str) -> Result<bool, PredicateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PredicateError("down".to_string()));
            }
            Ok(arg == "root")
        }
    }

    fn counting(fail: bool) -> Arc<CountingLookup> {
        Arc::new(CountingLookup {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn cache_bounds_lookups_until_ttl() -> Result<(), PredicateError> {
        let lookup = counting(false);
        let cached = CachedPredicate::new(lookup.clone(), Duration::from_secs(60));

        assert!(cached.evaluate("root").await?);
        assert!(cached.evaluate("root").await?);
        assert!(!cached.evaluate("guest").await?);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(cached.evaluate("root").await?);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let lookup = counting(true);
        let cached = CachedPredicate::new(lookup.clone(), Duration::from_secs(60));
        assert!(cached.evaluate("root").await.is_err());
        assert!(cached.evaluate("root").await.is_err());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn privileged_predicate_uses_lookup() -> Result<(), PredicateError> {
        let predicate = PrivilegedPredicate::new(Arc::new(StaticPrivileges::new(["root"])));
        assert!(predicate.evaluate("root").await?);
        assert!(!predicate.evaluate("alice").await?);
        Ok(())
    }
}
