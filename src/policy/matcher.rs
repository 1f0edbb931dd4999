//! Rule patterns compiled once when a rule is loaded or granted.

use super::{
    models::{AccessRequest, PolicyRule},
    PolicyError,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// `name(arg)` in a subject pattern.
static PREDICATE_CALL: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\(\s*([a-z]*)\s*\)$"));

/// Request field a predicate is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateArg {
    Subject,
    Object,
    Action,
}

impl PredicateArg {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "" | "sub" => Some(Self::Subject),
            "obj" => Some(Self::Object),
            "act" => Some(Self::Action),
            _ => None,
        }
    }

    #[must_use]
    pub fn pick<'a>(&self, request: &'a AccessRequest) -> &'a str {
        match self {
            Self::Subject => &request.subject,
            Self::Object => &request.object,
            Self::Action => &request.action,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SubjectMatcher {
    Any,
    Literal(String),
    Predicate { name: String, arg: PredicateArg },
}

impl SubjectMatcher {
    fn compile(pattern: &str) -> Result<Self, PolicyError> {
        if pattern == "*" {
            return Ok(Self::Any);
        }

        let call = PREDICATE_CALL
            .as_ref()
            .map_err(|err| PolicyError::invalid(pattern, err))?;
        if let Some(captures) = call.captures(pattern) {
            let name = captures.get(1).map_or("", |m| m.as_str());
            let raw_arg = captures.get(2).map_or("", |m| m.as_str());
            let arg = PredicateArg::parse(raw_arg).ok_or_else(|| {
                PolicyError::invalid(pattern, format!("unknown predicate argument: {raw_arg}"))
            })?;
            return Ok(Self::Predicate {
                name: name.to_string(),
                arg,
            });
        }

        Ok(Self::Literal(pattern.to_string()))
    }
}

#[derive(Debug, Clone)]
pub enum ActionMatcher {
    Any,
    Pattern(Regex),
}

impl ActionMatcher {
    fn compile(pattern: &str) -> Result<Self, PolicyError> {
        if pattern == "*" {
            return Ok(Self::Any);
        }
        Regex::new(&format!("^(?:{pattern})$"))
            .map(Self::Pattern)
            .map_err(|err| PolicyError::invalid(pattern, err))
    }

    #[must_use]
    pub fn matches(&self, action: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Pattern(regex) => regex.is_match(action),
        }
    }
}

/// Converts a path pattern into an anchored regular expression.
///
/// `*` matches any run of characters, `:name` and `{name}` match a single path segment,
/// everything else is literal.
fn key_pattern_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            ':' if chars.peek().is_some_and(|next| next.is_ascii_alphanumeric() || *next == '_') => {
                while chars
                    .peek()
                    .is_some_and(|next| next.is_ascii_alphanumeric() || *next == '_')
                {
                    chars.next();
                }
                out.push_str("[^/]+");
            }
            '{' => {
                for inner in chars.by_ref() {
                    if inner == '}' {
                        break;
                    }
                }
                out.push_str("[^/]+");
            }
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }

    out.push('$');
    out
}

/// Whether `path` matches the object pattern `pattern`.
#[must_use]
pub fn key_match(path: &str, pattern: &str) -> bool {
    Regex::new(&key_pattern_regex(pattern)).is_ok_and(|regex| regex.is_match(path))
}

#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PolicyRule,
    pub subject: SubjectMatcher,
    pub object: Regex,
    pub action: ActionMatcher,
}

impl CompiledRule {
    /// # Errors
    /// Returns `PolicyError::InvalidRule` if any pattern does not compile.
    pub fn compile(rule: PolicyRule) -> Result<Self, PolicyError> {
        let subject = SubjectMatcher::compile(&rule.subject)?;
        let object = Regex::new(&key_pattern_regex(&rule.object))
            .map_err(|err| PolicyError::invalid(&rule.object, err))?;
        let action = ActionMatcher::compile(&rule.action)?;
        Ok(Self {
            rule,
            subject,
            object,
            action,
        })
    }

    /// Domain, object and action checks. The subject may need a predicate and is checked separately.
    #[must_use]
    pub fn matches_resource(&self, request: &AccessRequest) -> bool {
        let domain_matches = self.rule.domain.is_empty()
            || request.domain.as_deref() == Some(self.rule.domain.as_str());
        domain_matches
            && self.object.is_match(&request.object)
            && self.action.matches(&request.action)
    }
}
