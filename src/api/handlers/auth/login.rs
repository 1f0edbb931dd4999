use super::{
    types::{LoginRequest, TokenResponse},
    utils::extract_client_ip,
};
use crate::{
    api::{error::ErrorBody, ApiError, GatewayState},
    identity::{AuthError, LoginAttempt},
};
use axum::{
    extract::{ConnectInfo, Extension},
    http::HeaderMap,
    Json,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{error, info, instrument};

#[utoipa::path(
    post,
    path = "/auth/token",
    request_body = LoginRequest,
    responses (
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 400, description = "Missing fields, or an expired or failed challenge", body = ErrorBody),
        (status = 401, description = "Incorrect username or password", body = ErrorBody),
        (status = 428, description = "Human verification required; data carries the challenge", body = ErrorBody),
        (status = 503, description = "Verification service busy", body = ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Extension(state): Extension<Arc<GatewayState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let origin = extract_client_ip(
        &headers,
        peer.map(|ConnectInfo(addr)| addr),
        &state.trusted_proxies,
    );
    let attempt = LoginAttempt::from(payload.map(|Json(request)| request).unwrap_or_default());

    let identity = match state.authenticator.authenticate(&attempt, &origin).await {
        Ok(identity) => identity,
        Err(AuthError::ChallengeRequired { identifier }) => {
            let descriptor = state
                .authenticator
                .challenges()
                .issue(&identifier, &state.app_credentials, state.challenge_ttl)
                .await?;
            return Err(ApiError::ChallengeRequired(descriptor));
        }
        Err(AuthError::MissingCredentials(fields)) => return Err(ApiError::Validation(fields)),
        Err(AuthError::Challenge(err)) => return Err(err.into()),
        Err(AuthError::AuthenticationFailed) => return Err(ApiError::AuthenticationFailed),
        Err(AuthError::GuardUnavailable) => return Err(ApiError::ServiceBusy),
    };

    let issued = state.tokens.issue(&identity.subject()).map_err(|err| {
        error!("Failed to issue token for {}: {err}", identity.id);
        ApiError::from(err)
    })?;

    info!("Issued session token for {} from {origin}", identity.id);

    Ok(Json(issued.into()))
}
