//! Error responses.
//!
//! Every failure leaves the gateway as `{code, message}` with an HTTP status.
//! Infrastructure details are logged where they happen and never reach the body.

use crate::{
    challenge::{ChallengeDescriptor, ChallengeError},
    identity::{FieldError, IdentityStatus},
    token::TokenError,
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

pub const CODE_INTERNAL: u32 = 100_002;
pub const CODE_VALIDATION: u32 = 100_003;
pub const CODE_TOKEN_INVALID: u32 = 100_101;
pub const CODE_MISSING_TOKEN: u32 = 100_103;
pub const CODE_AUTHENTICATION_FAILED: u32 = 100_104;
pub const CODE_PERMISSION_DENIED: u32 = 100_105;
pub const CODE_ACCOUNT_STATUS: u32 = 100_106;
pub const CODE_TOKEN_EXPIRED: u32 = 100_107;
pub const CODE_CHALLENGE_REQUIRED: u32 = 100_301;
pub const CODE_CHALLENGE_EXPIRED: u32 = 100_302;
pub const CODE_CHALLENGE_FAILED: u32 = 100_303;
pub const CODE_SERVICE_BUSY: u32 = 100_304;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug)]
pub enum ApiError {
    Validation(Vec<FieldError>),
    ChallengeRequired(ChallengeDescriptor),
    ChallengeExpired,
    /// Identifier mismatch and rejected proofs share one response.
    ChallengeFailed,
    ServiceBusy,
    AuthenticationFailed,
    MissingToken,
    TokenInvalid,
    TokenExpired,
    PermissionDenied,
    AccountStatusAbnormal(IdentityStatus),
    Internal,
}

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::ChallengeExpired | Self::ChallengeFailed => {
                StatusCode::BAD_REQUEST
            }
            Self::ChallengeRequired(_) => StatusCode::PRECONDITION_REQUIRED,
            Self::ServiceBusy => StatusCode::SERVICE_UNAVAILABLE,
            Self::AuthenticationFailed
            | Self::MissingToken
            | Self::TokenInvalid
            | Self::TokenExpired => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied | Self::AccountStatusAbnormal(_) => StatusCode::FORBIDDEN,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Validation(_) => CODE_VALIDATION,
            Self::ChallengeRequired(_) => CODE_CHALLENGE_REQUIRED,
            Self::ChallengeExpired => CODE_CHALLENGE_EXPIRED,
            Self::ChallengeFailed => CODE_CHALLENGE_FAILED,
            Self::ServiceBusy => CODE_SERVICE_BUSY,
            Self::AuthenticationFailed => CODE_AUTHENTICATION_FAILED,
            Self::MissingToken => CODE_MISSING_TOKEN,
            Self::TokenInvalid => CODE_TOKEN_INVALID,
            Self::TokenExpired => CODE_TOKEN_EXPIRED,
            Self::PermissionDenied => CODE_PERMISSION_DENIED,
            Self::AccountStatusAbnormal(_) => CODE_ACCOUNT_STATUS,
            Self::Internal => CODE_INTERNAL,
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "invalid request parameters",
            Self::ChallengeRequired(_) => "human verification required",
            Self::ChallengeExpired => "verification expired, please request a new one",
            Self::ChallengeFailed => "verification failed",
            Self::ServiceBusy => "service busy, please retry later",
            Self::AuthenticationFailed => "incorrect username or password",
            Self::MissingToken => "authorization token is missing",
            Self::TokenInvalid => "authorization token is invalid",
            Self::TokenExpired => "authorization token has expired",
            Self::PermissionDenied => "permission denied",
            Self::AccountStatusAbnormal(status) => status.denial_message(),
            Self::Internal => "internal server error",
        }
    }

    /// Whether the same request may succeed if retried later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ServiceBusy | Self::Internal)
    }

    fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(fields) => serde_json::to_value(fields).ok(),
            Self::ChallengeRequired(descriptor) => serde_json::to_value(descriptor).ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.message().to_string(),
            data: self.data(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<ChallengeError> for ApiError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::Expired => Self::ChallengeExpired,
            ChallengeError::Mismatch | ChallengeError::Invalid(_) => Self::ChallengeFailed,
            ChallengeError::ServiceBusy(_) => Self::ServiceBusy,
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid(_) => Self::TokenInvalid,
            TokenError::Expired | TokenError::RefreshExpired => Self::TokenExpired,
            TokenError::Signing(_) | TokenError::WeakKey(_) => {
                error!("Token signing failed: {err}");
                Self::Internal
            }
        }
    }
}
