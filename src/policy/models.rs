use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

impl Effect {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(format!("invalid effect: {other}")),
        }
    }
}

/// One authorization rule.
///
/// - `subject`: `*`, a literal subject, or a predicate call such as `isPrivileged(sub)`.
/// - `object`: a path pattern where `*` matches anything and `:id` / `{id}` match one segment.
/// - `action`: `*` or a regular expression matched against the whole action, e.g. `GET|POST`.
/// - `domain`: empty matches every domain.
///
/// Two rules are the same rule when subject, object, action and domain are equal.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub subject: String,
    pub object: String,
    pub action: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub effect: Effect,
}

impl PolicyRule {
    #[must_use]
    pub fn allow(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
            domain: String::new(),
            effect: Effect::Allow,
        }
    }

    #[must_use]
    pub fn deny(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow(subject, object, action)
        }
    }

    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    #[must_use]
    pub fn same_rule(&self, other: &Self) -> bool {
        self.subject == other.subject
            && self.object == other.object
            && self.action == other.action
            && self.domain == other.domain
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub subject: String,
    pub object: String,
    pub action: String,
    pub domain: Option<String>,
}

impl AccessRequest {
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
            domain: None,
        }
    }

    #[must_use]
    pub fn in_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}
