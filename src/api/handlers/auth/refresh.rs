use super::{types::TokenResponse, utils::extract_token};
use crate::api::{error::ErrorBody, ApiError, GatewayState};
use axum::{
    extract::Extension,
    http::{HeaderMap, Uri},
    Json,
};
use std::sync::Arc;
use tracing::{debug, instrument};

#[utoipa::path(
    put,
    path = "/auth/token",
    params(
        ("token" = Option<String>, Query, description = "Session token, when no Authorization header is sent")
    ),
    responses (
        (status = 200, description = "Token refreshed", body = TokenResponse),
        (status = 401, description = "Token missing, invalid, or past its refresh window", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn refresh(
    headers: HeaderMap,
    uri: Uri,
    Extension(state): Extension<Arc<GatewayState>>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = extract_token(&headers, &uri).ok_or(ApiError::MissingToken)?;

    let issued = state.tokens.refresh(&token).map_err(|err| {
        debug!("Refresh rejected: {err}");
        ApiError::from(err)
    })?;

    Ok(Json(issued.into()))
}
