use super::{
    error::ErrorBody,
    handlers::{
        auth::{
            self,
            types::{LoginRequest, TokenResponse},
        },
        health::{self, Health},
        me::{self, MeResponse},
        permissions::{self, ChangeResponse, PermissionRequest, RuleView},
    },
};
use crate::challenge::ChallengeDescriptor;
use utoipa::{
    openapi::{
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
        Components, Contact, InfoBuilder, License,
    },
    OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login,
        auth::refresh::refresh,
        me::me,
        permissions::list,
        permissions::grant,
        permissions::revoke,
    ),
    components(schemas(
        Health,
        LoginRequest,
        TokenResponse,
        ErrorBody,
        ChallengeDescriptor,
        MeResponse,
        RuleView,
        PermissionRequest,
        ChangeResponse,
    )),
    tags(
        (name = "health", description = "Service health"),
        (name = "auth", description = "Login and session token refresh"),
        (name = "identity", description = "The authenticated caller"),
        (name = "permissions", description = "Access rule administration"),
    )
)]
struct ApiDoc;

/// `OpenAPI` document for every route except `/`.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut spec = ApiDoc::openapi();
    spec.info = cargo_info();
    spec.components
        .get_or_insert_with(Components::new)
        .add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    spec
}

fn cargo_info() -> utoipa::openapi::Info {
    // Use Cargo.toml metadata instead of the derive defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();
    info
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    fn non_empty(value: &str) -> Option<&str> {
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }

    match author.find('<') {
        Some(start) => (
            non_empty(author[..start].trim()),
            non_empty(author[start + 1..].trim_end_matches('>').trim()),
        ),
        None => (non_empty(author.trim()), None),
    }
}
