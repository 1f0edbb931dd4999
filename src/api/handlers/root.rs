use super::health::app_header;
use crate::GIT_COMMIT_HASH;
use axum::response::IntoResponse;

// axum handler for /
pub async fn root() -> impl IntoResponse {
    let name = env!("CARGO_PKG_NAME");
    let version = env!("CARGO_PKG_VERSION");
    (
        app_header(name, version, GIT_COMMIT_HASH),
        format!("{name} {version}"),
    )
}
