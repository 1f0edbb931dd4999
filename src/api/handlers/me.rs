use crate::api::{error::ErrorBody, middleware::Principal};
use axum::{extract::Extension, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MeResponse {
    pub id: String,
    pub username: String,
    pub phone: Option<String>,
    pub status: String,
    /// Session token expiry, seconds since the epoch.
    pub token_expires_at: i64,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses (
        (status = 200, description = "The authenticated identity", body = MeResponse),
        (status = 401, description = "Token missing or invalid", body = ErrorBody),
        (status = 403, description = "Account not in a normal state, or access denied", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "identity"
)]
pub async fn me(Extension(principal): Extension<Principal>) -> Json<MeResponse> {
    let identity = principal.identity;
    Json(MeResponse {
        id: identity.subject(),
        username: identity.username,
        phone: identity.phone,
        status: identity.status.to_string(),
        token_expires_at: principal.claims.exp,
    })
}
