use super::{
    models::{AppCredentials, ChallengeDescriptor, ChallengeProof, ChallengeSession},
    provider::{ChallengeProvider, ProviderOutcome, VerificationRequest},
    ChallengeError,
};
use crate::storage::SessionStore;
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rand::{rngs::OsRng, RngCore};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

const SESSION_PREFIX: &str = "guard:challenge:";

#[derive(Debug, Clone, Copy)]
pub struct ChallengeConfig {
    verify_enabled: bool,
    single_use: bool,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            verify_enabled: true,
            single_use: true,
        }
    }
}

impl ChallengeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// When off, a proof is accepted once the session and identifier check out,
    /// without asking the provider.
    #[must_use]
    pub const fn with_verify_enabled(mut self, enabled: bool) -> Self {
        self.verify_enabled = enabled;
        self
    }

    #[must_use]
    pub const fn with_single_use(mut self, single_use: bool) -> Self {
        self.single_use = single_use;
        self
    }

    #[must_use]
    pub const fn verify_enabled(&self) -> bool {
        self.verify_enabled
    }

    #[must_use]
    pub const fn single_use(&self) -> bool {
        self.single_use
    }
}

/// Issues challenge sessions and checks proofs submitted against them.
#[derive(Clone)]
pub struct ChallengeManager {
    sessions: Arc<dyn SessionStore>,
    provider: Arc<dyn ChallengeProvider>,
    config: ChallengeConfig,
}

impl std::fmt::Debug for ChallengeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChallengeManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChallengeManager {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        provider: Arc<dyn ChallengeProvider>,
        config: ChallengeConfig,
    ) -> Self {
        Self {
            sessions,
            provider,
            config,
        }
    }

    /// Creates a session bound to `identifier` and returns what the client needs to solve it.
    ///
    /// # Errors
    /// Returns `ChallengeError::ServiceBusy` if randomness or the session store fails.
    pub async fn issue(
        &self,
        identifier: &str,
        credentials: &AppCredentials,
        ttl: Duration,
    ) -> Result<ChallengeDescriptor, ChallengeError> {
        let signature = generate_signature()?;
        let created_at = Utc::now();
        let expires_at = created_at
            + chrono::Duration::from_std(ttl)
                .map_err(|err| ChallengeError::ServiceBusy(err.to_string()))?;

        let session = ChallengeSession {
            signature,
            bound_identifier: identifier.to_string(),
            credentials: credentials.clone(),
            created_at,
            expires_at,
        };

        self.sessions
            .write_fields(&session_key(&session.signature), &session.to_fields(), ttl)
            .await
            .map_err(|err| {
                error!("Failed to store challenge session: {err}");
                ChallengeError::ServiceBusy(err.to_string())
            })?;

        debug!("Issued challenge session for {identifier}");

        Ok(session.descriptor())
    }

    /// Checks `proof` against the session named by `signature`.
    ///
    /// With single use on, the session is claimed before the provider is asked
    /// and put back if the proof does not pass.
    ///
    /// # Errors
    /// - `Expired` when the session does not exist or has lapsed.
    /// - `Mismatch` when `requester` is not the identifier the session was issued for.
    /// - `ServiceBusy` when the store or the provider cannot answer.
    /// - `Invalid` when the provider rejects the proof.
    pub async fn verify(
        &self,
        signature: &str,
        proof: &ChallengeProof,
        caller_ip: &str,
        requester: &str,
    ) -> Result<(), ChallengeError> {
        let key = session_key(signature);
        let fields = self
            .sessions
            .read_fields(&key)
            .await
            .map_err(|err| {
                error!("Failed to read challenge session: {err}");
                ChallengeError::ServiceBusy(err.to_string())
            })?
            .ok_or(ChallengeError::Expired)?;

        let session = ChallengeSession::from_fields(signature, &fields).map_err(|err| {
            error!("Discarding unreadable challenge session: {err}");
            ChallengeError::Expired
        })?;

        if session.bound_identifier != requester {
            warn!(
                "Challenge session bound to {} presented by {requester}",
                session.bound_identifier
            );
            return Err(ChallengeError::Mismatch);
        }

        if !self.config.single_use() {
            return self.check_proof(&session, proof, caller_ip, requester).await;
        }

        // Claim the session before the provider call so two concurrent
        // presentations cannot both succeed.
        let claimed = self.sessions.take_fields(&key).await.map_err(|err| {
            error!("Failed to claim challenge session: {err}");
            ChallengeError::ServiceBusy(err.to_string())
        })?;
        if claimed.is_none() {
            debug!("Challenge session for {requester} was claimed concurrently");
            return Err(ChallengeError::Expired);
        }

        let outcome = self.check_proof(&session, proof, caller_ip, requester).await;
        if outcome.is_err() {
            self.restore(&key, &session).await;
        }
        outcome
    }

    async fn check_proof(
        &self,
        session: &ChallengeSession,
        proof: &ChallengeProof,
        caller_ip: &str,
        requester: &str,
    ) -> Result<(), ChallengeError> {
        if !self.config.verify_enabled() {
            debug!("Challenge verification disabled, accepting proof for {requester}");
            return Ok(());
        }

        let outcome = self
            .provider
            .verify(&VerificationRequest {
                credentials: &session.credentials,
                proof,
                caller_ip,
            })
            .await
            .map_err(|err| {
                error!("Challenge provider unavailable: {err}");
                ChallengeError::ServiceBusy(err.to_string())
            })?;

        match outcome {
            ProviderOutcome::Verified => Ok(()),
            ProviderOutcome::Rejected { reason } => {
                info!("Challenge proof rejected for {requester}: {reason}");
                Err(ChallengeError::Invalid(reason))
            }
        }
    }

    /// Puts a claimed session back for whatever is left of its lifetime, so a
    /// rejected or unverifiable proof can be retried.
    async fn restore(&self, key: &str, session: &ChallengeSession) {
        let Ok(remaining) = (session.expires_at - Utc::now()).to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        if let Err(err) = self
            .sessions
            .write_fields(key, &session.to_fields(), remaining)
            .await
        {
            warn!("Failed to restore challenge session: {err}");
        }
    }
}

fn session_key(signature: &str) -> String {
    format!("{SESSION_PREFIX}{signature}")
}

fn generate_signature() -> Result<String, ChallengeError> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| ChallengeError::ServiceBusy(err.to_string()))?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        challenge::provider::ProviderError,
        storage::{Fields, MemorySessionStore, StorageError},
    };
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Provider fake returning a fixed answer and counting calls.
    struct FakeProvider {
        answer: fn() -> Result<ProviderOutcome, ProviderError>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn new(answer: fn() -> Result<ProviderOutcome, ProviderError>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChallengeProvider for FakeProvider {
        async fn verify(
            &self,
            _request: &VerificationRequest<'_>,
        ) -> Result<ProviderOutcome, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.answer)()
        }
    }

    struct BrokenSessions;

    #[async_trait]
    impl SessionStore for BrokenSessions {
        async fn write_fields(
            &self,
            _key: &str,
            _fields: &Fields,
            _ttl: Duration,
        ) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }

        async fn read_fields(&self, _key: &str) -> Result<Option<Fields>, StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }

        async fn take_fields(&self, _key: &str) -> Result<Option<Fields>, StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("down".to_string()))
        }
    }

    /// Accepts every proof after a short delay.
    struct SlowProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChallengeProvider for SlowProvider {
        async fn verify(
            &self,
            _request: &VerificationRequest<'_>,
        ) -> Result<ProviderOutcome, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(ProviderOutcome::Verified)
        }
    }

    fn verified() -> Result<ProviderOutcome, ProviderError> {
        Ok(ProviderOutcome::Verified)
    }

    fn rejected() -> Result<ProviderOutcome, ProviderError> {
        Ok(ProviderOutcome::Rejected {
            reason: "bad ticket".to_string(),
        })
    }

    fn unavailable() -> Result<ProviderOutcome, ProviderError> {
        Err(ProviderError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }

    fn credentials() -> AppCredentials {
        AppCredentials::new("190000", SecretString::from("app-secret"))
    }

    fn proof() -> ChallengeProof {
        ChallengeProof {
            ticket: "ticket".to_string(),
            rand_str: "rand".to_string(),
        }
    }

    const TTL: Duration = Duration::from_secs(300);

    #[tokio::test]
    async fn issue_returns_unique_signatures() -> Result<(), ChallengeError> {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(verified),
            ChallengeConfig::new(),
        );
        let first = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        let second = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        assert_ne!(first.signature, second.signature);
        assert_eq!(first.signature.len(), 43);
        assert_eq!(first.captcha_app_id, "190000");
        Ok(())
    }

    #[tokio::test]
    async fn verify_succeeds_for_bound_identifier() -> Result<(), ChallengeError> {
        let provider = FakeProvider::new(verified);
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            provider.clone(),
            ChallengeConfig::new(),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        manager
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await?;
        assert_eq!(provider.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn verify_rejects_other_identifier_before_provider() -> Result<(), ChallengeError> {
        let provider = FakeProvider::new(verified);
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            provider.clone(),
            ChallengeConfig::new(),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        let result = manager
            .verify(&descriptor.signature, &proof(), "5.6.7.8", "login:5.6.7.8")
            .await;
        assert!(matches!(result, Err(ChallengeError::Mismatch)));
        assert_eq!(provider.calls(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn verify_after_ttl_is_expired() -> Result<(), ChallengeError> {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(verified),
            ChallengeConfig::new(),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let result = manager
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await;
        assert!(matches!(result, Err(ChallengeError::Expired)));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_signature_is_expired() {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(verified),
            ChallengeConfig::new(),
        );
        let result = manager
            .verify("nope", &proof(), "1.2.3.4", "login:1.2.3.4")
            .await;
        assert!(matches!(result, Err(ChallengeError::Expired)));
    }

    #[tokio::test]
    async fn disabled_verification_skips_provider() -> Result<(), ChallengeError> {
        let provider = FakeProvider::new(rejected);
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            provider.clone(),
            ChallengeConfig::new().with_verify_enabled(false),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        manager
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await?;
        assert_eq!(provider.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_verification_still_checks_binding() -> Result<(), ChallengeError> {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(verified),
            ChallengeConfig::new().with_verify_enabled(false),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        let result = manager
            .verify(&descriptor.signature, &proof(), "5.6.7.8", "login:5.6.7.8")
            .await;
        assert!(matches!(result, Err(ChallengeError::Mismatch)));
        Ok(())
    }

    #[tokio::test]
    async fn provider_rejection_is_invalid() -> Result<(), ChallengeError> {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(rejected),
            ChallengeConfig::new(),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        let result = manager
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await;
        assert!(matches!(result, Err(ChallengeError::Invalid(reason)) if reason == "bad ticket"));
        Ok(())
    }

    #[tokio::test]
    async fn provider_outage_is_busy() -> Result<(), ChallengeError> {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(unavailable),
            ChallengeConfig::new(),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        let result = manager
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await;
        assert!(matches!(result, Err(ChallengeError::ServiceBusy(_))));
        Ok(())
    }

    #[tokio::test]
    async fn single_use_consumes_session() -> Result<(), ChallengeError> {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(verified),
            ChallengeConfig::new(),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        manager
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await?;
        let replay = manager
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await;
        assert!(matches!(replay, Err(ChallengeError::Expired)));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_presentations_of_one_session_admit_one() -> Result<(), ChallengeError> {
        let provider = Arc::new(SlowProvider {
            calls: AtomicUsize::new(0),
        });
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            provider.clone(),
            ChallengeConfig::new(),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;

        let ticket = proof();
        let (first, second) = tokio::join!(
            manager.verify(&descriptor.signature, &ticket, "1.2.3.4", "login:1.2.3.4"),
            manager.verify(&descriptor.signature, &ticket, "1.2.3.4", "login:1.2.3.4"),
        );

        let admitted = [&first, &second].iter().filter(|result| result.is_ok()).count();
        assert_eq!(admitted, 1);
        assert!(
            matches!(first, Err(ChallengeError::Expired))
                || matches!(second, Err(ChallengeError::Expired))
        );
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn rejected_proof_leaves_session_for_a_retry() -> Result<(), ChallengeError> {
        let sessions = Arc::new(MemorySessionStore::new());
        let descriptor = ChallengeManager::new(
            sessions.clone(),
            FakeProvider::new(verified),
            ChallengeConfig::new(),
        )
        .issue("login:1.2.3.4", &credentials(), TTL)
        .await?;

        let rejecting = ChallengeManager::new(
            sessions.clone(),
            FakeProvider::new(rejected),
            ChallengeConfig::new(),
        );
        let result = rejecting
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await;
        assert!(matches!(result, Err(ChallengeError::Invalid(_))));

        let accepting = ChallengeManager::new(sessions, FakeProvider::new(verified), ChallengeConfig::new());
        accepting
            .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn reusable_session_when_single_use_is_off() -> Result<(), ChallengeError> {
        let manager = ChallengeManager::new(
            Arc::new(MemorySessionStore::new()),
            FakeProvider::new(verified),
            ChallengeConfig::new().with_single_use(false),
        );
        let descriptor = manager.issue("login:1.2.3.4", &credentials(), TTL).await?;
        for _ in 0..2 {
            manager
                .verify(&descriptor.signature, &proof(), "1.2.3.4", "login:1.2.3.4")
                .await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn store_outage_is_busy() {
        let manager = ChallengeManager::new(
            Arc::new(BrokenSessions),
            FakeProvider::new(verified),
            ChallengeConfig::new(),
        );
        assert!(matches!(
            manager.issue("login:1.2.3.4", &credentials(), TTL).await,
            Err(ChallengeError::ServiceBusy(_))
        ));
        assert!(matches!(
            manager
                .verify("sig", &proof(), "1.2.3.4", "login:1.2.3.4")
                .await,
            Err(ChallengeError::ServiceBusy(_))
        ));
    }
}
