use serde::{Deserialize, Serialize};

/// Claims carried by every session token. Anything else in the payload is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionClaims {
    pub iss: String,
    pub aud: String,
    /// Identity id.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}
