use crate::{identity::LoginAttempt, token::IssuedToken};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Login form. Fields are optional so that missing ones surface as validation details.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Captcha ticket, required once the caller is challenged.
    pub ticket: Option<String>,
    pub rand_str: Option<String>,
    /// Challenge signature returned with the 428 response.
    pub signature: Option<String>,
}

impl From<LoginRequest> for LoginAttempt {
    fn from(request: LoginRequest) -> Self {
        Self {
            username: request.username,
            password: request.password,
            ticket: request.ticket,
            rand_str: request.rand_str,
            signature: request.signature,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub token: String,
    /// RFC 3339 expiry.
    pub expire: String,
}

impl From<IssuedToken> for TokenResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            expire: issued.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn login_request_accepts_partial_payload() -> Result<(), serde_json::Error> {
        let request: LoginRequest = serde_json::from_str(r#"{"username": "alice"}"#)?;
        let attempt = LoginAttempt::from(request);
        assert_eq!(attempt.username.as_deref(), Some("alice"));
        assert!(attempt.password.is_none());
        Ok(())
    }

    #[test]
    fn token_response_formats_expiry() {
        let expires_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).single();
        assert!(expires_at.is_some());
        if let Some(expires_at) = expires_at {
            let response = TokenResponse::from(IssuedToken {
                token: "t".to_string(),
                expires_at,
            });
            assert_eq!(response.expire, "2026-01-02T03:04:05Z");
        }
    }
}
