//! Login orchestration: validation, rate guard, step-up challenge, credential check.

use super::{
    models::Identity,
    password::CredentialHasher,
    repo::{IdentityLookup, IdentityStore},
};
use crate::{
    challenge::{ChallengeError, ChallengeManager, ChallengeProof},
    guard::{GuardDecision, GuardFailurePolicy, GuardLimits, RateGuard},
};
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, warn};

pub const MAX_USERNAME_LEN: usize = 20;

/// Scope prefix for login attempt counters and challenge sessions.
pub const LOGIN_SCOPE: &str = "login";

static PHONE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^1[3-9]\d{9}$").ok());

/// Hashed once and verified against when the identity does not exist, so a
/// miss costs as much as a wrong password.
const DECOY_SECRET: &str = "warden-decoy-credential";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing or malformed credentials")]
    MissingCredentials(Vec<FieldError>),
    #[error("challenge required for {identifier}")]
    ChallengeRequired { identifier: String },
    #[error(transparent)]
    Challenge(#[from] ChallengeError),
    #[error("authentication failed")]
    AuthenticationFailed,
    #[error("attempt counter unavailable")]
    GuardUnavailable,
}

/// Raw login submission. Every field is optional until validated.
#[derive(Debug, Clone, Default)]
pub struct LoginAttempt {
    pub username: Option<String>,
    pub password: Option<String>,
    pub ticket: Option<String>,
    pub rand_str: Option<String>,
    pub signature: Option<String>,
}

impl LoginAttempt {
    /// Checks required fields and returns the username and password.
    ///
    /// # Errors
    /// Returns every field problem found, not just the first.
    pub fn validate(&self) -> Result<(&str, &str), Vec<FieldError>> {
        let mut errors = Vec::new();

        let username = self.username.as_deref().map(str::trim).unwrap_or_default();
        if username.is_empty() {
            errors.push(FieldError {
                field: "username",
                message: "username is required",
            });
        } else if username.chars().count() > MAX_USERNAME_LEN {
            errors.push(FieldError {
                field: "username",
                message: "username must be at most 20 characters",
            });
        }

        let password = self.password.as_deref().unwrap_or_default();
        if password.is_empty() {
            errors.push(FieldError {
                field: "password",
                message: "password is required",
            });
        }

        if errors.is_empty() {
            Ok((username, password))
        } else {
            Err(errors)
        }
    }

    /// The full proof triple, or `None` if any part is missing.
    #[must_use]
    pub fn proof(&self) -> Option<(&str, ChallengeProof)> {
        let non_empty = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let ticket = non_empty(&self.ticket)?;
        let rand_str = non_empty(&self.rand_str)?;
        let signature = self
            .signature
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())?;
        Some((signature, ChallengeProof { ticket, rand_str }))
    }
}

#[must_use]
pub fn looks_like_phone(username: &str) -> bool {
    PHONE
        .as_ref()
        .is_some_and(|regex| regex.is_match(username))
}

#[derive(Clone)]
pub struct Authenticator {
    guard: RateGuard,
    challenges: ChallengeManager,
    identities: Arc<dyn IdentityStore>,
    hasher: Arc<dyn CredentialHasher>,
    decoy: Arc<OnceCell<String>>,
    limits: GuardLimits,
    failure_policy: GuardFailurePolicy,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("limits", &self.limits)
            .field("failure_policy", &self.failure_policy)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(
        guard: RateGuard,
        challenges: ChallengeManager,
        identities: Arc<dyn IdentityStore>,
        hasher: Arc<dyn CredentialHasher>,
    ) -> Self {
        Self {
            guard,
            challenges,
            identities,
            hasher,
            decoy: Arc::new(OnceCell::new()),
            limits: GuardLimits::new(10, Duration::from_secs(3600)),
            failure_policy: GuardFailurePolicy::default(),
        }
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: GuardLimits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn with_failure_policy(mut self, policy: GuardFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    #[must_use]
    pub fn challenges(&self) -> &ChallengeManager {
        &self.challenges
    }

    /// Authenticates a login attempt coming from `origin` (the client address).
    ///
    /// Account status is not checked here; that happens when the token is used.
    ///
    /// # Errors
    /// See [`AuthError`]. Unknown users and wrong passwords are both
    /// `AuthenticationFailed`.
    pub async fn authenticate(
        &self,
        attempt: &LoginAttempt,
        origin: &str,
    ) -> Result<Identity, AuthError> {
        let (username, password) = attempt.validate().map_err(AuthError::MissingCredentials)?;

        let identifier = format!("{LOGIN_SCOPE}:{origin}");
        if self.requires_challenge(&identifier).await? {
            let Some((signature, proof)) = attempt.proof() else {
                debug!("Login from {origin} needs a challenge");
                return Err(AuthError::ChallengeRequired { identifier });
            };
            self.challenges
                .verify(signature, &proof, origin, &identifier)
                .await?;
        }

        let by = if looks_like_phone(username) {
            IdentityLookup::Phone
        } else {
            IdentityLookup::Username
        };

        let identity = match self.identities.get(username, by).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!("Login for unknown identity from {origin}");
                self.verify_decoy(password);
                return Err(AuthError::AuthenticationFailed);
            }
            Err(err) => {
                error!("Failed to look up identity: {err}");
                self.verify_decoy(password);
                return Err(AuthError::AuthenticationFailed);
            }
        };

        if !self.hasher.verify(&identity.password_hash, password) {
            debug!("Wrong password for {} from {origin}", identity.id);
            return Err(AuthError::AuthenticationFailed);
        }

        Ok(identity)
    }

    fn verify_decoy(&self, password: &str) {
        match self
            .decoy
            .get_or_try_init(|| self.hasher.hash(DECOY_SECRET))
        {
            Ok(digest) => {
                let _ = self.hasher.verify(digest, password);
            }
            Err(err) => warn!("Failed to prepare decoy digest: {err}"),
        }
    }

    async fn requires_challenge(&self, identifier: &str) -> Result<bool, AuthError> {
        match self.guard.check(identifier, self.limits).await {
            Ok(GuardDecision::Allow) => Ok(false),
            Ok(GuardDecision::Escalate) => Ok(true),
            Err(err) => match self.failure_policy {
                GuardFailurePolicy::Open => {
                    warn!("Rate guard unavailable, allowing {identifier}: {err}");
                    Ok(false)
                }
                GuardFailurePolicy::Closed => {
                    error!("Rate guard unavailable, refusing {identifier}: {err}");
                    Err(AuthError::GuardUnavailable)
                }
            },
        }
    }
}
