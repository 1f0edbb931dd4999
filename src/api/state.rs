use super::handlers::auth::utils::TrustedProxies;
use crate::{
    challenge::AppCredentials,
    identity::{Authenticator, IdentityStore},
    policy::EnforcerHandle,
    token::TokenIssuer,
};
use std::{sync::Arc, time::Duration};

/// Everything the handlers share. Built once at startup and handed out as an `Extension`.
#[derive(Clone)]
pub struct GatewayState {
    pub authenticator: Authenticator,
    pub tokens: Arc<TokenIssuer>,
    pub enforcer: EnforcerHandle,
    pub identities: Arc<dyn IdentityStore>,
    /// Captcha application the issued challenges are bound to.
    pub app_credentials: AppCredentials,
    pub challenge_ttl: Duration,
    pub trusted_proxies: TrustedProxies,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("authenticator", &self.authenticator)
            .field("enforcer", &self.enforcer)
            .field("challenge_ttl", &self.challenge_ttl)
            .field("trusted_proxies", &self.trusted_proxies)
            .finish_non_exhaustive()
    }
}
