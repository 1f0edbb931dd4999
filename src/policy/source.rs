//! Where rules are persisted.

use super::models::{Effect, PolicyRule};
use crate::storage::StorageError;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tokio::sync::Mutex;
use tracing::Instrument;

#[async_trait]
pub trait PolicySource: Send + Sync {
    /// All rules in evaluation order.
    ///
    /// # Errors
    /// Returns `StorageError` when the source cannot be read.
    async fn load(&self) -> Result<Vec<PolicyRule>, StorageError>;

    /// Appends `rule`. Returns `false` if the same rule already exists.
    ///
    /// # Errors
    /// Returns `StorageError` when the source cannot be written.
    async fn add(&self, rule: &PolicyRule) -> Result<bool, StorageError>;

    /// Removes `rule`. Returns `false` if it was not there.
    ///
    /// # Errors
    /// Returns `StorageError` when the source cannot be written.
    async fn remove(&self, rule: &PolicyRule) -> Result<bool, StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryPolicySource {
    rules: Mutex<Vec<PolicyRule>>,
}

impl MemoryPolicySource {
    #[must_use]
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }
}

#[async_trait]
impl PolicySource for MemoryPolicySource {
    async fn load(&self) -> Result<Vec<PolicyRule>, StorageError> {
        Ok(self.rules.lock().await.clone())
    }

    async fn add(&self, rule: &PolicyRule) -> Result<bool, StorageError> {
        let mut rules = self.rules.lock().await;
        if rules.iter().any(|existing| existing.same_rule(rule)) {
            return Ok(false);
        }
        rules.push(rule.clone());
        Ok(true)
    }

    async fn remove(&self, rule: &PolicyRule) -> Result<bool, StorageError> {
        let mut rules = self.rules.lock().await;
        let before = rules.len();
        rules.retain(|existing| !existing.same_rule(rule));
        Ok(rules.len() != before)
    }
}

#[derive(Debug, Clone)]
pub struct PgPolicySource {
    pool: PgPool,
}

impl PgPolicySource {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicySource for PgPolicySource {
    async fn load(&self) -> Result<Vec<PolicyRule>, StorageError> {
        let query = "SELECT subject, object, action, domain, effect FROM policy_rules ORDER BY id";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT"
        );
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(span)
            .await?;

        rows.iter()
            .map(|row| -> Result<PolicyRule, StorageError> {
                let effect: String = row.try_get("effect")?;
                Ok(PolicyRule {
                    subject: row.try_get("subject")?,
                    object: row.try_get("object")?,
                    action: row.try_get("action")?,
                    domain: row.try_get("domain")?,
                    effect: effect.parse::<Effect>().map_err(StorageError::Malformed)?,
                })
            })
            .collect()
    }

    async fn add(&self, rule: &PolicyRule) -> Result<bool, StorageError> {
        let query = r"
            INSERT INTO policy_rules (subject, object, action, domain, effect)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (subject, object, action, domain) DO NOTHING
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let result = sqlx::query(query)
            .bind(&rule.subject)
            .bind(&rule.object)
            .bind(&rule.action)
            .bind(&rule.domain)
            .bind(rule.effect.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, rule: &PolicyRule) -> Result<bool, StorageError> {
        let query = r"
            DELETE FROM policy_rules
            WHERE subject = $1 AND object = $2 AND action = $3 AND domain = $4
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE"
        );
        let result = sqlx::query(query)
            .bind(&rule.subject)
            .bind(&rule.object)
            .bind(&rule.action)
            .bind(&rule.domain)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
