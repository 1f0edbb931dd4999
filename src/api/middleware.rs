//! Gate in front of every protected route: token, identity, account status, policy.

use super::{handlers::auth::utils::extract_token, ApiError, GatewayState};
use crate::{
    identity::{Identity, IdentityLookup, IdentityStatus},
    policy::AccessRequest,
    token::SessionClaims,
};
use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// The authenticated caller, available to protected handlers as an extension.
#[derive(Debug, Clone)]
pub struct Principal {
    pub identity: Identity,
    pub claims: SessionClaims,
}

/// # Errors
/// Responds with 401 for token problems or an unknown subject, 403 for an abnormal
/// account or a denied request, and 500 when the identity store or policy engine fails.
pub async fn authorize(
    Extension(state): Extension<Arc<GatewayState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token =
        extract_token(request.headers(), request.uri()).ok_or(ApiError::MissingToken)?;

    let claims = state.tokens.verify(&token).map_err(|err| {
        debug!("Rejected token: {err}");
        ApiError::from(err)
    })?;

    let identity = match state
        .identities
        .get(&claims.sub, IdentityLookup::Subject)
        .await
    {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            warn!("Token subject {} no longer exists", claims.sub);
            return Err(ApiError::TokenInvalid);
        }
        Err(err) => {
            error!("Failed to load identity {}: {err}", claims.sub);
            return Err(ApiError::Internal);
        }
    };

    if !identity.status.is_normal() {
        if let IdentityStatus::Unknown(value) = identity.status {
            error!(
                "Identity {} has unrecognised status {value}, denying access",
                identity.id
            );
        } else {
            debug!("Identity {} is {}", identity.id, identity.status);
        }
        return Err(ApiError::AccountStatusAbnormal(identity.status));
    }

    let access = AccessRequest::new(
        identity.subject(),
        request.uri().path(),
        request.method().as_str(),
    );
    match state.enforcer.enforce(&access).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(
                "Denied {} {} {}",
                access.subject, access.action, access.object
            );
            return Err(ApiError::PermissionDenied);
        }
        Err(err) => {
            error!("Policy evaluation failed: {err}");
            return Err(ApiError::Internal);
        }
    }

    request
        .extensions_mut()
        .insert(Principal { identity, claims });

    Ok(next.run(request).await)
}
