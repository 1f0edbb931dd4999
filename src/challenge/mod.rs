//! Step-up challenges for clients the rate guard has escalated.
//!
//! A session is issued for one identifier (e.g. `login:<ip>`) and one provider
//! app, lives for a fixed TTL, and is checked against the external provider when
//! the client comes back with a solved proof.

pub mod models;
pub mod provider;
pub mod service;

pub use models::{AppCredentials, ChallengeDescriptor, ChallengeProof, ChallengeSession};
pub use provider::{ChallengeProvider, HttpChallengeProvider, ProviderError, ProviderOutcome};
pub use service::{ChallengeConfig, ChallengeManager};

#[derive(Debug, thiserror::Error)]
pub enum ChallengeError {
    #[error("challenge session expired or unknown")]
    Expired,
    #[error("challenge session was issued for another requester")]
    Mismatch,
    #[error("challenge proof rejected: {0}")]
    Invalid(String),
    #[error("challenge service unavailable: {0}")]
    ServiceBusy(String),
}

impl ChallengeError {
    /// Whether retrying the same proof later could succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceBusy(_))
    }
}
