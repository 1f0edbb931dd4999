use crate::{
    challenge::{AppCredentials, ChallengeConfig, ChallengeManager, HttpChallengeProvider},
    guard::{GuardFailurePolicy, GuardLimits, RateGuard},
    identity::{Argon2Hasher, Authenticator, PgIdentityStore},
    policy::{
        enforcer::spawn_reloader, CachedPredicate, Enforcer, PgPolicySource, PgPrivilegeLookup,
        PrivilegedPredicate, IS_PRIVILEGED,
    },
    storage::postgres::{spawn_expiry_sweeper, PgCounterStore, PgSessionStore},
    token::{TokenConfig, TokenIssuer},
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn,
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer,
    timeout::TimeoutLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use url::Url;

pub mod error;
pub mod handlers;
pub mod middleware;
mod openapi;
pub mod state;

pub use error::ApiError;
pub use handlers::auth::utils::TrustedProxies;
pub use middleware::Principal;
pub use openapi::openapi;
pub use state::GatewayState;

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Captcha provider account and the application challenges are issued for.
#[derive(Debug, Clone)]
pub struct CaptchaSettings {
    pub app: AppCredentials,
    pub secret_id: String,
    pub secret_key: SecretString,
    pub endpoint: Url,
    /// When off, proofs are not sent to the provider.
    pub verify: bool,
    pub timeout: Duration,
}

/// Everything `new` needs besides the listen port and the database.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub tokens: TokenConfig,
    pub limits: GuardLimits,
    pub failure_policy: GuardFailurePolicy,
    pub captcha: CaptchaSettings,
    pub challenge_ttl: Duration,
    pub challenge_single_use: bool,
    pub predicate_cache_ttl: Duration,
    /// How often rules are re-read from the database; zero turns it off.
    pub policy_reload_interval: Duration,
    pub trusted_proxies: TrustedProxies,
    pub request_timeout: Duration,
}

/// Routes served by the gateway, minus `/health` which needs the database pool.
///
/// Everything under `/v1` goes through [`middleware::authorize`].
pub fn router(state: Arc<GatewayState>) -> Router {
    let protected = Router::new()
        .route("/v1/me", get(handlers::me))
        .route(
            "/v1/permissions",
            post(handlers::permissions::grant).delete(handlers::permissions::revoke),
        )
        .route(
            "/v1/permissions/:subject",
            get(handlers::permissions::list),
        )
        .route_layer(from_fn(middleware::authorize));

    Router::new()
        .route("/", get(handlers::root))
        .route(
            "/auth/token",
            post(handlers::auth::login).put(handlers::auth::refresh),
        )
        .merge(protected)
        .layer(Extension(state))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, dsn: String, settings: GatewaySettings) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    let sweeper = spawn_expiry_sweeper(pool.clone(), EXPIRY_SWEEP_INTERVAL);

    let tokens = Arc::new(TokenIssuer::new(settings.tokens).context("Invalid JWT settings")?);

    let provider = HttpChallengeProvider::new(
        settings.captcha.endpoint,
        settings.captcha.secret_id,
        settings.captcha.secret_key,
        settings.captcha.timeout,
    )?;
    let challenges = ChallengeManager::new(
        Arc::new(PgSessionStore::new(pool.clone())),
        Arc::new(provider),
        ChallengeConfig::new()
            .with_verify_enabled(settings.captcha.verify)
            .with_single_use(settings.challenge_single_use),
    );

    let identities = Arc::new(PgIdentityStore::new(pool.clone()));
    let authenticator = Authenticator::new(
        RateGuard::new(Arc::new(PgCounterStore::new(pool.clone()))),
        challenges,
        identities.clone(),
        Arc::new(Argon2Hasher::new()),
    )
    .with_limits(settings.limits)
    .with_failure_policy(settings.failure_policy);

    let privileged = CachedPredicate::new(
        PrivilegedPredicate::new(Arc::new(PgPrivilegeLookup::new(pool.clone()))),
        settings.predicate_cache_ttl,
    );
    let enforcer = Enforcer::builder()
        .predicate(IS_PRIVILEGED, Arc::new(privileged))
        .init(Arc::new(PgPolicySource::new(pool.clone())))
        .await
        .context("Failed to load access rules")?;
    let reloader = (!settings.policy_reload_interval.is_zero())
        .then(|| spawn_reloader(enforcer.clone(), settings.policy_reload_interval));

    let state = Arc::new(GatewayState {
        authenticator,
        tokens,
        enforcer,
        identities,
        app_credentials: settings.captcha.app,
        challenge_ttl: settings.challenge_ttl,
        trusted_proxies: settings.trusted_proxies,
    });

    let app = router(state)
        .route("/health", get(handlers::health).options(handlers::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(TimeoutLayer::new(settings.request_timeout))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {err}");
        }
        info!("Gracefully shutdown");
    })
    .await?;

    sweeper.abort();
    if let Some(reloader) = reloader {
        reloader.abort();
    }

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
