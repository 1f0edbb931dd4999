use crate::storage::{Fields, StorageError};
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const FIELD_BOUND_IDENTIFIER: &str = "bound_identifier";
const FIELD_APP_ID: &str = "provider_app_id";
const FIELD_APP_SECRET: &str = "provider_app_secret";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_EXPIRES_AT: &str = "expires_at";

/// Provider application the challenge is issued under.
#[derive(Clone, Debug)]
pub struct AppCredentials {
    pub app_id: String,
    pub app_secret: SecretString,
}

impl AppCredentials {
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_secret: SecretString) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret,
        }
    }
}

/// Client-solved challenge submitted alongside a retried request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeProof {
    pub ticket: String,
    pub rand_str: String,
}

/// What the client needs to render and solve the challenge.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ChallengeDescriptor {
    pub signature: String,
    pub captcha_app_id: String,
}

#[derive(Clone, Debug)]
pub struct ChallengeSession {
    pub signature: String,
    pub bound_identifier: String,
    pub credentials: AppCredentials,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ChallengeSession {
    pub(crate) fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            FIELD_BOUND_IDENTIFIER.to_string(),
            self.bound_identifier.clone(),
        );
        fields.insert(FIELD_APP_ID.to_string(), self.credentials.app_id.clone());
        fields.insert(
            FIELD_APP_SECRET.to_string(),
            self.credentials.app_secret.expose_secret().to_string(),
        );
        fields.insert(
            FIELD_CREATED_AT.to_string(),
            self.created_at.timestamp().to_string(),
        );
        fields.insert(
            FIELD_EXPIRES_AT.to_string(),
            self.expires_at.timestamp().to_string(),
        );
        fields
    }

    pub(crate) fn from_fields(signature: &str, fields: &Fields) -> Result<Self, StorageError> {
        let field = |name: &str| {
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| StorageError::Malformed(format!("challenge session missing {name}")))
        };
        let timestamp = |name: &str| -> Result<DateTime<Utc>, StorageError> {
            let raw = field(name)?;
            raw.parse::<i64>()
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .ok_or_else(|| StorageError::Malformed(format!("invalid {name}: {raw}")))
        };

        Ok(Self {
            signature: signature.to_string(),
            bound_identifier: field(FIELD_BOUND_IDENTIFIER)?,
            credentials: AppCredentials::new(
                field(FIELD_APP_ID)?,
                SecretString::from(field(FIELD_APP_SECRET)?),
            ),
            created_at: timestamp(FIELD_CREATED_AT)?,
            expires_at: timestamp(FIELD_EXPIRES_AT)?,
        })
    }

    #[must_use]
    pub fn descriptor(&self) -> ChallengeDescriptor {
        ChallengeDescriptor {
            signature: self.signature.clone(),
            captcha_app_id: self.credentials.app_id.clone(),
        }
    }
}
