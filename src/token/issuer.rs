use super::{claims::SessionClaims, TokenError};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Shortest signing key accepted for HS512.
pub const MIN_KEY_LEN: usize = 64;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    key: SecretString,
    issuer: String,
    audience: String,
    timeout: Duration,
    max_refresh: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self {
            key,
            issuer: "warden".to_string(),
            audience: "api.warden.dev".to_string(),
            timeout: Duration::from_secs(3600),
            max_refresh: Duration::from_secs(24 * 3600),
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_refresh(mut self, max_refresh: Duration) -> Self {
        self.max_refresh = max_refresh;
        self
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn audience(&self) -> &str {
        &self.audience
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub const fn max_refresh(&self) -> Duration {
        self.max_refresh
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Mints, verifies and refreshes HS512 session tokens.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    config: TokenConfig,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("issuer", &self.config.issuer)
            .field("audience", &self.config.audience)
            .field("timeout", &self.config.timeout)
            .field("max_refresh", &self.config.max_refresh)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// # Errors
    /// Returns `TokenError::WeakKey` if the key is shorter than [`MIN_KEY_LEN`] bytes.
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        let secret = config.key.expose_secret().as_bytes();
        if secret.len() < MIN_KEY_LEN {
            return Err(TokenError::WeakKey(MIN_KEY_LEN));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// # Errors
    /// Returns `TokenError::Signing` if the token cannot be encoded.
    pub fn issue(&self, subject: &str) -> Result<IssuedToken, TokenError> {
        self.issue_at(subject, Utc::now())
    }

    /// # Errors
    /// Returns `TokenError::Signing` if the token cannot be encoded.
    pub fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let iat = now.timestamp();
        let exp = iat.saturating_add(seconds(self.config.timeout));
        let claims = SessionClaims {
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            sub: subject.to_string(),
            iat,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(|err| TokenError::Signing(err.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: timestamp(exp)?,
        })
    }

    /// # Errors
    /// `TokenError::Invalid` for a bad signature, issuer, audience or shape,
    /// `TokenError::Expired` once `exp` has passed.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// # Errors
    /// See [`TokenIssuer::verify`].
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let claims = self.decode(token)?;
        if claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Issues a fresh token for the subject of `token`, whose expiry is ignored.
    ///
    /// # Errors
    /// `TokenError::Invalid` for a token that does not verify,
    /// `TokenError::RefreshExpired` once `max_refresh` has passed since it was issued.
    pub fn refresh(&self, token: &str) -> Result<IssuedToken, TokenError> {
        self.refresh_at(token, Utc::now())
    }

    /// # Errors
    /// See [`TokenIssuer::refresh`].
    pub fn refresh_at(&self, token: &str, now: DateTime<Utc>) -> Result<IssuedToken, TokenError> {
        let claims = self.decode(token)?;
        let refresh_deadline = claims.iat.saturating_add(seconds(self.config.max_refresh));
        if now.timestamp() >= refresh_deadline {
            return Err(TokenError::RefreshExpired);
        }
        self.issue_at(&claims.sub, now)
    }

    // Checks signature, issuer, audience and shape. Expiry is left to the caller.
    fn decode(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid(err.to_string()),
            })
    }
}

fn seconds(duration: Duration) -> i64 {
    i64::try_from(duration.as_secs()).unwrap_or(i64::MAX)
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| TokenError::Signing(format!("expiry out of range: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64ct::{Base64UrlUnpadded, Encoding};
    use chrono::Duration as ChronoDuration;

    const KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn issuer() -> Result<TokenIssuer, TokenError> {
        TokenIssuer::new(
            TokenConfig::new(SecretString::from(KEY))
                .with_timeout(Duration::from_secs(3600))
                .with_max_refresh(Duration::from_secs(24 * 3600)),
        )
    }

    fn at(secs: i64) -> Result<DateTime<Utc>, TokenError> {
        timestamp(secs)
    }

    const T0: i64 = 1_700_000_000;

    #[test]
    fn short_key_is_rejected() {
        let result = TokenIssuer::new(TokenConfig::new(SecretString::from("short")));
        assert!(matches!(result, Err(TokenError::WeakKey(MIN_KEY_LEN))));
    }

    #[test]
    fn issued_token_carries_fixed_claims() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let issued = issuer.issue_at("subject-1", at(T0)?)?;
        assert_eq!(issued.expires_at, at(T0 + 3600)?);

        let claims = issuer.verify_at(&issued.token, at(T0 + 10)?)?;
        assert_eq!(
            claims,
            SessionClaims {
                iss: "warden".to_string(),
                aud: "api.warden.dev".to_string(),
                sub: "subject-1".to_string(),
                iat: T0,
                exp: T0 + 3600,
            }
        );
        Ok(())
    }

    #[test]
    fn header_is_hs512() -> Result<(), TokenError> {
        let issued = issuer()?.issue_at("s", at(T0)?)?;
        let header = jsonwebtoken::decode_header(&issued.token)
            .map_err(|err| TokenError::Invalid(err.to_string()))?;
        assert_eq!(header.alg, Algorithm::HS512);
        Ok(())
    }

    #[test]
    fn verify_rejects_expired() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let issued = issuer.issue_at("s", at(T0)?)?;
        assert!(matches!(
            issuer.verify_at(&issued.token, at(T0 + 3600)?),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_other_key_and_audience() -> Result<(), TokenError> {
        let other_key = TokenIssuer::new(TokenConfig::new(SecretString::from(
            "fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210",
        )))?;
        let other_audience = TokenIssuer::new(
            TokenConfig::new(SecretString::from(KEY)).with_audience("somewhere-else"),
        )?;
        let issuer = issuer()?;

        let forged = other_key.issue_at("s", at(T0)?)?;
        assert!(matches!(
            issuer.verify_at(&forged.token, at(T0)?),
            Err(TokenError::Invalid(_))
        ));

        let misdirected = other_audience.issue_at("s", at(T0)?)?;
        assert!(matches!(
            issuer.verify_at(&misdirected.token, at(T0)?),
            Err(TokenError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_extra_claims() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let payload = serde_json::json!({
            "iss": "warden", "aud": "api.warden.dev", "sub": "s",
            "iat": T0, "exp": T0 + 3600, "role": "root"
        });
        let token = encode(
            &Header::new(Algorithm::HS512),
            &payload,
            &EncodingKey::from_secret(KEY.as_bytes()),
        )
        .map_err(|err| TokenError::Signing(err.to_string()))?;
        assert!(matches!(
            issuer.verify_at(&token, at(T0)?),
            Err(TokenError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn verify_rejects_unsigned_token() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let issued = issuer.issue_at("s", at(T0)?)?;
        let mut parts = issued.token.split('.');
        let (Some(_), Some(payload)) = (parts.next(), parts.next()) else {
            return Err(TokenError::Invalid("malformed".to_string()));
        };
        let none_header = Base64UrlUnpadded::encode_string(br#"{"alg":"none","typ":"JWT"}"#);
        let unsigned = format!("{none_header}.{payload}.");
        assert!(matches!(
            issuer.verify_at(&unsigned, at(T0)?),
            Err(TokenError::Invalid(_))
        ));
        Ok(())
    }

    #[test]
    fn refresh_window_is_measured_from_issue_time() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let issued = issuer.issue_at("subject-1", at(T0)?)?;

        let refresh_time = at(T0 + 23 * 3600)?;
        let refreshed = issuer.refresh_at(&issued.token, refresh_time)?;
        assert_eq!(refreshed.expires_at, refresh_time + ChronoDuration::hours(1));

        let claims = issuer.verify_at(&refreshed.token, refresh_time)?;
        assert_eq!(claims.sub, "subject-1");
        assert_eq!(claims.iat, T0 + 23 * 3600);

        assert!(matches!(
            issuer.refresh_at(&issued.token, at(T0 + 25 * 3600)?),
            Err(TokenError::RefreshExpired)
        ));
        Ok(())
    }

    #[test]
    fn refresh_rejects_tampered_token() -> Result<(), TokenError> {
        let issuer = issuer()?;
        let issued = issuer.issue_at("s", at(T0)?)?;
        let tampered = format!("{}x", issued.token);
        assert!(matches!(
            issuer.refresh_at(&tampered, at(T0)?),
            Err(TokenError::Invalid(_))
        ));
        Ok(())
    }
}
