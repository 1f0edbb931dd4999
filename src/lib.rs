//! # Warden (adaptive authentication and authorization gateway)
//!
//! `warden` sits in front of protected HTTP routes. It logs users in, issues and
//! refreshes bearer session tokens, and decides per request whether the caller may
//! act on the requested path.
//!
//! ## Login
//!
//! Attempts are counted per client address over a sliding window. Once the count
//! reaches the configured burst, the caller gets a `428` carrying a challenge
//! signature and must come back with a captcha proof bound to that signature.
//! Proofs are checked with the captcha provider and consumed on success.
//!
//! Unknown users and wrong passwords produce the same response.
//!
//! ## Sessions
//!
//! Tokens are HS512 JWTs with a fixed claim set (`iss`, `aud`, `sub`, `iat`, `exp`).
//! A token can be refreshed after it expires, as long as it is still inside the
//! refresh window measured from its `iat`.
//!
//! ## Authorization
//!
//! Every `/v1` request passes through the policy engine. Rules are
//! `(subject, object, action, domain, effect)` tuples loaded from Postgres; the first
//! matching rule decides, and no match denies. Subjects can call named predicates
//! such as `isPrivileged(sub)`.

pub mod api;
pub mod challenge;
pub mod cli;
pub mod guard;
pub mod identity;
pub mod policy;
pub mod storage;
pub mod token;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
