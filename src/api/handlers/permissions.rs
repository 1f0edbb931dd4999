//! Rule administration. Callers reach these only if a rule lets them.

use crate::{
    api::{error::ErrorBody, middleware::Principal, ApiError, GatewayState},
    identity::FieldError,
    policy::{PolicyError, PolicyRule},
};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuleView {
    pub subject: String,
    pub object: String,
    pub action: String,
    pub domain: String,
    pub effect: String,
}

impl From<PolicyRule> for RuleView {
    fn from(rule: PolicyRule) -> Self {
        Self {
            subject: rule.subject,
            object: rule.object,
            action: rule.action,
            domain: rule.domain,
            effect: rule.effect.to_string(),
        }
    }
}

/// Grants and revokes always concern allow rules.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct PermissionRequest {
    pub subject: String,
    pub object: String,
    pub action: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl From<PermissionRequest> for PolicyRule {
    fn from(request: PermissionRequest) -> Self {
        let rule = Self::allow(request.subject, request.object, request.action);
        match request.domain {
            Some(domain) => rule.with_domain(domain),
            None => rule,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChangeResponse {
    pub changed: bool,
}

const MISSING_BODY: FieldError = FieldError {
    field: "body",
    message: "expected subject, object and action",
};

fn policy_failure(err: PolicyError) -> ApiError {
    match err {
        PolicyError::InvalidRule { .. } => ApiError::Validation(vec![FieldError {
            field: "rule",
            message: "pattern does not compile",
        }]),
        err => {
            error!("Policy update failed: {err}");
            ApiError::Internal
        }
    }
}

#[utoipa::path(
    get,
    path = "/v1/permissions/{subject}",
    params(("subject" = String, Path, description = "Subject pattern the rules were written for")),
    responses (
        (status = 200, description = "Rules written for the subject", body = [RuleView]),
        (status = 403, description = "Access denied", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "permissions"
)]
pub async fn list(
    Path(subject): Path<String>,
    Extension(state): Extension<Arc<GatewayState>>,
) -> Json<Vec<RuleView>> {
    let rules = state.enforcer.permissions_for(&subject).await;
    Json(rules.into_iter().map(RuleView::from).collect())
}

#[utoipa::path(
    post,
    path = "/v1/permissions",
    request_body = PermissionRequest,
    responses (
        (status = 201, description = "Rule granted", body = ChangeResponse),
        (status = 200, description = "Rule already present", body = ChangeResponse),
        (status = 400, description = "Rule does not compile", body = ErrorBody),
        (status = 403, description = "Access denied", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "permissions"
)]
pub async fn grant(
    Extension(state): Extension<Arc<GatewayState>>,
    Extension(principal): Extension<Principal>,
    payload: Option<Json<PermissionRequest>>,
) -> Result<(StatusCode, Json<ChangeResponse>), ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation(vec![MISSING_BODY]));
    };

    let rule = PolicyRule::from(request);
    let changed = state
        .enforcer
        .grant(rule.clone())
        .await
        .map_err(policy_failure)?;

    if changed {
        info!("{} granted {:?}", principal.identity.id, rule);
        Ok((StatusCode::CREATED, Json(ChangeResponse { changed })))
    } else {
        Ok((StatusCode::OK, Json(ChangeResponse { changed })))
    }
}

#[utoipa::path(
    delete,
    path = "/v1/permissions",
    request_body = PermissionRequest,
    responses (
        (status = 200, description = "Whether a rule was removed", body = ChangeResponse),
        (status = 403, description = "Access denied", body = ErrorBody),
    ),
    security(("bearer" = [])),
    tag = "permissions"
)]
pub async fn revoke(
    Extension(state): Extension<Arc<GatewayState>>,
    Extension(principal): Extension<Principal>,
    payload: Option<Json<PermissionRequest>>,
) -> Result<Json<ChangeResponse>, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::Validation(vec![MISSING_BODY]));
    };

    let rule = PolicyRule::from(request);
    let changed = state
        .enforcer
        .revoke(&rule)
        .await
        .map_err(policy_failure)?;

    if changed {
        info!("{} revoked {:?}", principal.identity.id, rule);
    }

    Ok(Json(ChangeResponse { changed }))
}
