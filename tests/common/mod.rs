#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, Method, Request, StatusCode},
    Router,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::{
    net::{IpAddr, SocketAddr},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tower::ServiceExt;
use uuid::Uuid;
use warden::{
    api::{self, GatewayState, TrustedProxies},
    challenge::{
        provider::VerificationRequest, AppCredentials, ChallengeConfig, ChallengeManager,
        ChallengeProvider, ProviderError, ProviderOutcome,
    },
    guard::{GuardLimits, RateGuard},
    identity::{
        Argon2Hasher, Authenticator, CredentialHasher, Identity, IdentityStatus,
        MemoryIdentityStore,
    },
    policy::{
        CachedPredicate, Enforcer, MemoryPolicySource, PolicyRule, PrivilegedPredicate,
        StaticPrivileges, IS_PRIVILEGED,
    },
    storage::memory::{MemoryCounterStore, MemorySessionStore},
    token::{TokenConfig, TokenIssuer},
};

pub const PASSWORD: &str = "correct horse battery";
pub const GOOD_TICKET: &str = "solved";
pub const CAPTCHA_APP_ID: &str = "190000";
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(3600);

/// Accepts `GOOD_TICKET` and rejects everything else.
#[derive(Default)]
pub struct FakeProvider {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ChallengeProvider for FakeProvider {
    async fn verify(
        &self,
        request: &VerificationRequest<'_>,
    ) -> Result<ProviderOutcome, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.proof.ticket == GOOD_TICKET {
            Ok(ProviderOutcome::Verified)
        } else {
            Ok(ProviderOutcome::Rejected {
                reason: "ticket error".to_string(),
            })
        }
    }
}

pub struct Gateway {
    pub app: Router,
    pub tokens: Arc<TokenIssuer>,
    pub provider: Arc<FakeProvider>,
    pub alice: Uuid,
    pub frank: Uuid,
    pub root: Uuid,
}

fn identity(hasher: &Argon2Hasher, username: &str, status: IdentityStatus) -> Result<Identity> {
    Ok(Identity {
        id: Uuid::new_v4(),
        username: username.to_string(),
        phone: None,
        password_hash: hasher.hash(PASSWORD)?,
        status,
    })
}

/// A gateway backed by in-memory stores.
///
/// Users: `alice` (normal), `frank` (frozen) and `root` (normal, privileged).
/// Rules: anyone may `GET /v1/me`; privileged subjects may manage permissions.
pub async fn gateway(burst: i64) -> Result<Gateway> {
    gateway_with_proxies(burst, TrustedProxies::default()).await
}

/// Like [`gateway`], believing forwarding headers from `trusted_proxies`.
pub async fn gateway_with_proxies(burst: i64, trusted_proxies: TrustedProxies) -> Result<Gateway> {
    let params = argon2::Params::new(1024, 1, 1, None).map_err(|err| anyhow::anyhow!("{err}"))?;
    let hasher = Argon2Hasher::with_params(params);

    let alice = identity(&hasher, "alice", IdentityStatus::Normal)?;
    let frank = identity(&hasher, "frank", IdentityStatus::Frozen)?;
    let root = identity(&hasher, "root", IdentityStatus::Normal)?;
    let (alice_id, frank_id, root_id) = (alice.id, frank.id, root.id);

    let identities = Arc::new(MemoryIdentityStore::new());
    identities.insert(alice);
    identities.insert(frank);
    identities.insert(root);

    let provider = Arc::new(FakeProvider::default());
    let challenges = ChallengeManager::new(
        Arc::new(MemorySessionStore::new()),
        provider.clone(),
        ChallengeConfig::new(),
    );
    let authenticator = Authenticator::new(
        RateGuard::new(Arc::new(MemoryCounterStore::new())),
        challenges,
        identities.clone(),
        Arc::new(hasher),
    )
    .with_limits(GuardLimits::new(burst, Duration::from_secs(600)));

    let tokens = Arc::new(TokenIssuer::new(
        TokenConfig::new(SecretString::from("s".repeat(64))).with_timeout(TOKEN_TIMEOUT),
    )?);

    let privileged = CachedPredicate::new(
        PrivilegedPredicate::new(Arc::new(StaticPrivileges::new([root_id.to_string()]))),
        Duration::from_secs(60),
    );
    let enforcer = Enforcer::builder()
        .predicate(IS_PRIVILEGED, Arc::new(privileged))
        .init(Arc::new(MemoryPolicySource::new(vec![
            PolicyRule::allow("*", "/v1/me", "GET"),
            PolicyRule::allow("isPrivileged(sub)", "/v1/permissions*", "GET|POST|DELETE"),
        ])))
        .await?;

    let state = Arc::new(GatewayState {
        authenticator,
        tokens: tokens.clone(),
        enforcer,
        identities,
        app_credentials: AppCredentials::new(CAPTCHA_APP_ID, SecretString::from("app-secret")),
        challenge_ttl: Duration::from_secs(300),
        trusted_proxies,
    });

    Ok(Gateway {
        app: api::router(state),
        tokens,
        provider,
        alice: alice_id,
        frank: frank_id,
        root: root_id,
    })
}

pub struct Reply {
    pub status: StatusCode,
    pub bytes: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.bytes).context("response is not JSON")
    }

    pub fn code(&self) -> Option<u64> {
        self.json().ok().and_then(|body| body["code"].as_u64())
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> Result<Reply> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?.to_vec();
    Ok(Reply { status, bytes })
}

/// A login arriving on a connection from `peer`.
pub fn login_request(peer: &str, body: &Value) -> Result<Request<Body>> {
    let mut request = Request::builder()
        .method(Method::POST)
        .uri("/auth/token")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body)?))?;
    let ip: IpAddr = peer.parse()?;
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::new(ip, 51000)));
    Ok(request)
}

/// A login from `peer` claiming to forward for `forwarded_for`.
pub fn forwarded_login_request(peer: &str, forwarded_for: &str, body: &Value) -> Result<Request<Body>> {
    let mut request = login_request(peer, body)?;
    request
        .headers_mut()
        .insert("x-forwarded-for", forwarded_for.parse()?);
    Ok(request)
}

pub fn credentials(username: &str, password: &str) -> Value {
    json!({"username": username, "password": password})
}

pub async fn login(app: &Router, username: &str) -> Result<String> {
    let reply = send(app, login_request("10.1.1.1", &credentials(username, PASSWORD))?).await?;
    anyhow::ensure!(
        reply.status == StatusCode::OK,
        "login for {username} returned {}",
        reply.status
    );
    reply.json()?["token"]
        .as_str()
        .map(str::to_string)
        .context("token missing from login response")
}

pub fn authorized(method: Method, uri: &str, token: &str, body: Option<&Value>) -> Result<Request<Body>> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(AUTHORIZATION, format!("Bearer {token}"));
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(body)?))?,
        None => builder.body(Body::empty())?,
    };
    Ok(request)
}
