//! External challenge verification.

use super::models::{AppCredentials, ChallengeProof};
use crate::APP_USER_AGENT;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, Instrument};
use url::Url;

/// Slider puzzle, the only challenge type the gateway issues.
const CAPTCHA_TYPE: u8 = 9;
const CAPTCHA_CODE_OK: i64 = 1;

pub struct VerificationRequest<'a> {
    pub credentials: &'a AppCredentials,
    pub proof: &'a ChallengeProof,
    pub caller_ip: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Verified,
    Rejected { reason: String },
}

/// The provider could not give an answer; retrying later may succeed.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("challenge provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("challenge provider returned {0}")]
    Status(StatusCode),
    #[error("challenge app id is not numeric: {0}")]
    AppId(String),
}

#[async_trait]
pub trait ChallengeProvider: Send + Sync {
    /// Asks the provider whether `request.proof` solves a challenge for the app.
    ///
    /// # Errors
    /// Returns `ProviderError` when the provider cannot be reached or answers
    /// with something other than a verdict.
    async fn verify(
        &self,
        request: &VerificationRequest<'_>,
    ) -> Result<ProviderOutcome, ProviderError>;
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct DescribeCaptchaResult<'a> {
    captcha_type: u8,
    ticket: &'a str,
    user_ip: &'a str,
    randstr: &'a str,
    captcha_app_id: u64,
    app_secret_key: &'a str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct DescribeCaptchaResponse {
    response: CaptchaVerdict,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct CaptchaVerdict {
    captcha_code: i64,
    #[serde(default)]
    captcha_msg: String,
}

#[derive(Debug)]
pub struct HttpChallengeProvider {
    client: Client,
    endpoint: Url,
    secret_id: String,
    secret_key: SecretString,
}

impl HttpChallengeProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: Url,
        secret_id: String,
        secret_key: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build challenge provider client")?;
        Ok(Self {
            client,
            endpoint,
            secret_id,
            secret_key,
        })
    }
}

#[async_trait]
impl ChallengeProvider for HttpChallengeProvider {
    async fn verify(
        &self,
        request: &VerificationRequest<'_>,
    ) -> Result<ProviderOutcome, ProviderError> {
        let app_id = &request.credentials.app_id;
        let captcha_app_id = app_id
            .parse()
            .map_err(|_| ProviderError::AppId(app_id.clone()))?;
        let payload = DescribeCaptchaResult {
            captcha_type: CAPTCHA_TYPE,
            ticket: &request.proof.ticket,
            user_ip: request.caller_ip,
            randstr: &request.proof.rand_str,
            captcha_app_id,
            app_secret_key: request.credentials.app_secret.expose_secret(),
        };

        let span = tracing::info_span!("challenge.verify", http.url = %self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .basic_auth(&self.secret_id, Some(self.secret_key.expose_secret()))
            .json(&payload)
            .send()
            .instrument(span)
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status(status));
        }

        let body: DescribeCaptchaResponse = response.json().await?;
        debug!(
            "Challenge provider answered code {} ({})",
            body.response.captcha_code, body.response.captcha_msg
        );

        if body.response.captcha_code == CAPTCHA_CODE_OK {
            Ok(ProviderOutcome::Verified)
        } else {
            Ok(ProviderOutcome::Rejected {
                reason: body.response.captcha_msg,
            })
        }
    }
}
