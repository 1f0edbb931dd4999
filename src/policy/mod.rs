//! Authorization: rules, predicates and the shared engine that evaluates them.

pub mod enforcer;
pub mod matcher;
pub mod models;
pub mod predicate;
pub mod source;

pub use enforcer::{Enforcer, EnforcerBuilder, EnforcerHandle};
pub use models::{AccessRequest, Effect, PolicyRule};
pub use predicate::{
    CachedPredicate, PgPrivilegeLookup, Predicate, PredicateError, PrivilegeLookup,
    PrivilegedPredicate, StaticPrivileges, IS_PRIVILEGED,
};
pub use source::{MemoryPolicySource, PgPolicySource, PolicySource};

use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("policy source error: {0}")]
    Source(#[from] StorageError),
    #[error("invalid rule pattern {pattern:?}: {reason}")]
    InvalidRule { pattern: String, reason: String },
    #[error("rule references unregistered predicate {0}")]
    UnknownPredicate(String),
    #[error("predicate {name} failed: {source}")]
    Predicate {
        name: String,
        #[source]
        source: PredicateError,
    },
}

impl PolicyError {
    pub(crate) fn invalid(pattern: &str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidRule {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        }
    }
}
