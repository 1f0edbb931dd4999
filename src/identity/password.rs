//! Password digests.

use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand::rngs::OsRng;

#[derive(Debug, thiserror::Error)]
#[error("failed to hash password: {0}")]
pub struct HashError(String);

pub trait CredentialHasher: Send + Sync {
    /// # Errors
    /// Returns `HashError` if the digest cannot be computed.
    fn hash(&self, secret: &str) -> Result<String, HashError>;

    /// `false` for a wrong secret and for a digest that cannot be parsed.
    fn verify(&self, digest: &str, secret: &str) -> bool;
}

/// Argon2id in PHC string format.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: argon2::Params,
}

impl Argon2Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_params(params: argon2::Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, secret: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(secret.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| HashError(err.to_string()))
    }

    fn verify(&self, digest: &str, secret: &str) -> bool {
        PasswordHash::new(digest).is_ok_and(|parsed| {
            self.argon2()
                .verify_password(secret.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> Result<Argon2Hasher, String> {
        // Small parameters keep the tests fast.
        argon2::Params::new(1024, 1, 1, None)
            .map(Argon2Hasher::with_params)
            .map_err(|err| err.to_string())
    }

    #[test]
    fn verify_accepts_the_hashed_secret() -> Result<(), Box<dyn std::error::Error>> {
        let hasher = hasher()?;
        let digest = hasher.hash("correct horse")?;
        assert!(digest.starts_with("$argon2id$"));
        assert!(hasher.verify(&digest, "correct horse"));
        assert!(!hasher.verify(&digest, "battery staple"));
        Ok(())
    }

    #[test]
    fn same_secret_gets_distinct_salts() -> Result<(), Box<dyn std::error::Error>> {
        let hasher = hasher()?;
        assert_ne!(hasher.hash("pw")?, hasher.hash("pw")?);
        Ok(())
    }

    #[test]
    fn garbage_digest_never_verifies() -> Result<(), Box<dyn std::error::Error>> {
        let hasher = hasher()?;
        assert!(!hasher.verify("not-a-phc-string", "pw"));
        assert!(!hasher.verify("", ""));
        Ok(())
    }
}
