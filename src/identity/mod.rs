//! Identities, their credentials, and the login flow that checks them.

pub mod authenticator;
pub mod models;
pub mod password;
pub mod repo;

pub use authenticator::{AuthError, Authenticator, FieldError, LoginAttempt};
pub use models::{Identity, IdentityStatus};
pub use password::{Argon2Hasher, CredentialHasher};
pub use repo::{IdentityLookup, IdentityStore, MemoryIdentityStore, PgIdentityStore};
