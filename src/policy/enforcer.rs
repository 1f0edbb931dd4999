//! The shared policy engine.
//!
//! Built once at startup with [`Enforcer::builder`] and handed to every consumer
//! as an [`EnforcerHandle`]. Evaluations take the read lock, so they run
//! concurrently; rule changes take the write lock and are never observed half-applied.

use super::{
    matcher::{CompiledRule, SubjectMatcher},
    models::{AccessRequest, Effect, PolicyRule},
    predicate::Predicate,
    source::PolicySource,
    PolicyError,
};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{
    sync::RwLock,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, error, info};

pub type EnforcerHandle = Arc<Enforcer>;

struct PolicyState {
    rules: Vec<CompiledRule>,
    predicates: HashMap<String, Arc<dyn Predicate>>,
}

pub struct Enforcer {
    source: Arc<dyn PolicySource>,
    state: RwLock<PolicyState>,
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer").finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct EnforcerBuilder {
    predicates: HashMap<String, Arc<dyn Predicate>>,
}

impl EnforcerBuilder {
    #[must_use]
    pub fn predicate(mut self, name: impl Into<String>, predicate: Arc<dyn Predicate>) -> Self {
        self.predicates.insert(name.into(), predicate);
        self
    }

    /// Loads every rule from `source` and returns the shared handle.
    ///
    /// # Errors
    /// Returns `PolicyError` if the source cannot be read or a stored rule does not compile.
    pub async fn init(self, source: Arc<dyn PolicySource>) -> Result<EnforcerHandle, PolicyError> {
        let rules = compile_all(source.load().await?)?;
        info!(
            "Policy engine loaded {} rules and {} predicates",
            rules.len(),
            self.predicates.len()
        );
        Ok(Arc::new(Enforcer {
            source,
            state: RwLock::new(PolicyState {
                rules,
                predicates: self.predicates,
            }),
        }))
    }
}

fn compile_all(rules: Vec<PolicyRule>) -> Result<Vec<CompiledRule>, PolicyError> {
    rules.into_iter().map(CompiledRule::compile).collect()
}

impl Enforcer {
    #[must_use]
    pub fn builder() -> EnforcerBuilder {
        EnforcerBuilder::default()
    }

    /// Decides `request`. The first rule that matches it decides; no match denies.
    ///
    /// # Errors
    /// Returns `PolicyError::UnknownPredicate` or `PolicyError::Predicate` if a
    /// rule's predicate cannot be evaluated. The request must then be refused.
    pub async fn enforce(&self, request: &AccessRequest) -> Result<bool, PolicyError> {
        let state = self.state.read().await;

        for compiled in &state.rules {
            if !compiled.matches_resource(request) {
                continue;
            }
            if !subject_matches(compiled, request, &state.predicates).await? {
                continue;
            }

            debug!(
                "{} {} {} matched {:?}",
                request.subject, request.action, request.object, compiled.rule
            );
            return Ok(compiled.rule.effect == Effect::Allow);
        }

        debug!(
            "{} {} {} matched no rule",
            request.subject, request.action, request.object
        );
        Ok(false)
    }

    /// Adds `rule`, persisting it before it takes effect.
    ///
    /// Returns `false` if the same rule already exists.
    ///
    /// # Errors
    /// Returns `PolicyError` if the rule does not compile or cannot be persisted.
    pub async fn grant(&self, rule: PolicyRule) -> Result<bool, PolicyError> {
        let compiled = CompiledRule::compile(rule)?;
        let mut state = self.state.write().await;

        if state
            .rules
            .iter()
            .any(|existing| existing.rule.same_rule(&compiled.rule))
        {
            return Ok(false);
        }

        self.source.add(&compiled.rule).await?;
        info!("Granted {:?}", compiled.rule);
        state.rules.push(compiled);
        Ok(true)
    }

    /// Removes `rule`. Returns `false` if no such rule existed.
    ///
    /// # Errors
    /// Returns `PolicyError::Source` if the removal cannot be persisted.
    pub async fn revoke(&self, rule: &PolicyRule) -> Result<bool, PolicyError> {
        let mut state = self.state.write().await;

        let Some(position) = state
            .rules
            .iter()
            .position(|existing| existing.rule.same_rule(rule))
        else {
            return Ok(false);
        };

        self.source.remove(rule).await?;
        let removed = state.rules.remove(position);
        info!("Revoked {:?}", removed.rule);
        Ok(true)
    }

    /// Rules whose subject pattern is exactly `subject`.
    pub async fn permissions_for(&self, subject: &str) -> Vec<PolicyRule> {
        self.state
            .read()
            .await
            .rules
            .iter()
            .filter(|compiled| compiled.rule.subject == subject)
            .map(|compiled| compiled.rule.clone())
            .collect()
    }

    /// Whether an allow rule for exactly this subject, object and action exists.
    /// Patterns and predicates are not evaluated.
    pub async fn has_permission(&self, subject: &str, object: &str, action: &str) -> bool {
        self.state.read().await.rules.iter().any(|compiled| {
            compiled.rule.subject == subject
                && compiled.rule.object == object
                && compiled.rule.action == action
                && compiled.rule.effect == Effect::Allow
        })
    }

    /// Registers or replaces a named predicate.
    pub async fn register_predicate(&self, name: impl Into<String>, predicate: Arc<dyn Predicate>) {
        self.state
            .write()
            .await
            .predicates
            .insert(name.into(), predicate);
    }

    /// Replaces the in-memory rules with whatever the source holds now.
    ///
    /// # Errors
    /// Returns `PolicyError` if the source cannot be read or a rule does not compile;
    /// the current rules are kept in that case.
    pub async fn reload(&self) -> Result<usize, PolicyError> {
        let rules = compile_all(self.source.load().await?)?;
        let count = rules.len();
        self.state.write().await.rules = rules;
        debug!("Policy engine reloaded {count} rules");
        Ok(count)
    }
}

/// Background task that re-reads the rules every `every`, so grants and revokes
/// made through another instance become visible here.
pub fn spawn_reloader(enforcer: EnforcerHandle, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately and the rules were just loaded
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = enforcer.reload().await {
                error!("Failed to reload access rules, keeping the current ones: {err}");
            }
        }
    })
}

async fn subject_matches(
    compiled: &CompiledRule,
    request: &AccessRequest,
    predicates: &HashMap<String, Arc<dyn Predicate>>,
) -> Result<bool, PolicyError> {
    match &compiled.subject {
        SubjectMatcher::Any => Ok(true),
        SubjectMatcher::Literal(subject) => Ok(*subject == request.subject),
        SubjectMatcher::Predicate { name, arg } => {
            let predicate = predicates
                .get(name)
                .ok_or_else(|| PolicyError::UnknownPredicate(name.clone()))?;
            predicate
                .evaluate(arg.pick(request))
                .await
                .map_err(|source| PolicyError::Predicate {
                    name: name.clone(),
                    source,
                })
        }
    }
}
