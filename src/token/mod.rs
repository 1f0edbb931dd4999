//! Bearer session tokens.

pub mod claims;
pub mod issuer;

pub use claims::SessionClaims;
pub use issuer::{IssuedToken, TokenConfig, TokenIssuer, MIN_KEY_LEN};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is invalid: {0}")]
    Invalid(String),
    #[error("token has expired")]
    Expired,
    #[error("token is past its refresh window")]
    RefreshExpired,
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("signing key must be at least {0} bytes")]
    WeakKey(usize),
}
