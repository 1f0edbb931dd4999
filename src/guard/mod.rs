//! Attempt counting with escalation to a challenge.
//!
//! Each check increments a shared counter for the identifier and re-arms its
//! expiry, so the window measures time since the most recent attempt. Once the
//! count reaches the burst the caller must present a solved challenge.
//! The counter is never decremented; it only resets by expiring.

use crate::storage::{CounterStore, StorageError};
use std::{str::FromStr, sync::Arc, time::Duration};
use tracing::warn;

const COUNTER_PREFIX: &str = "guard:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Escalate,
}

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("attempt counter unavailable: {0}")]
    Store(#[from] StorageError),
}

/// What the caller does when the counter store cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GuardFailurePolicy {
    /// Log and let the attempt through.
    #[default]
    Open,
    /// Refuse the attempt with a retryable error.
    Closed,
}

impl FromStr for GuardFailurePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            other => Err(format!("invalid guard failure policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardLimits {
    burst: i64,
    window: Duration,
}

impl GuardLimits {
    #[must_use]
    pub const fn new(burst: i64, window: Duration) -> Self {
        Self { burst, window }
    }

    #[must_use]
    pub const fn burst(&self) -> i64 {
        self.burst
    }

    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// A non-positive burst or a zero window turns the guard off.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.burst <= 0 || self.window.is_zero()
    }
}

#[derive(Clone)]
pub struct RateGuard {
    counters: Arc<dyn CounterStore>,
}

impl RateGuard {
    #[must_use]
    pub fn new(counters: Arc<dyn CounterStore>) -> Self {
        Self { counters }
    }

    /// Records an attempt for `identifier` and decides whether it must be escalated.
    ///
    /// # Errors
    /// Returns `GuardError::Store` if the counter could not be incremented. That is
    /// not an escalation; the caller applies its [`GuardFailurePolicy`].
    pub async fn check(
        &self,
        identifier: &str,
        limits: GuardLimits,
    ) -> Result<GuardDecision, GuardError> {
        if limits.is_disabled() {
            return Ok(GuardDecision::Allow);
        }

        let key = format!("{COUNTER_PREFIX}{identifier}");
        let count = self.counters.increment(&key).await?;

        if let Err(err) = self.counters.expire(&key, limits.window()).await {
            warn!("Failed to re-arm expiry for {key}: {err}");
        }

        if count < limits.burst() {
            Ok(GuardDecision::Allow)
        } else {
            Ok(GuardDecision::Escalate)
        }
    }
}

impl std::fmt::Debug for RateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGuard").finish_non_exhaustive()
    }
}
