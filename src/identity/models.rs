use serde::{Serialize, Serializer};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::fmt;
use uuid::Uuid;

/// Account state persisted in `users.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStatus {
    Normal,
    Deleted,
    /// Held by risk control.
    Flagged,
    Frozen,
    /// A value this build does not know about. Treated as not allowed.
    Unknown(i16),
}

impl IdentityStatus {
    #[must_use]
    pub const fn from_db(value: i16) -> Self {
        match value {
            0 => Self::Normal,
            1 => Self::Deleted,
            2 => Self::Flagged,
            3 => Self::Frozen,
            other => Self::Unknown(other),
        }
    }

    #[must_use]
    pub const fn as_db(self) -> i16 {
        match self {
            Self::Normal => 0,
            Self::Deleted => 1,
            Self::Flagged => 2,
            Self::Frozen => 3,
            Self::Unknown(value) => value,
        }
    }

    #[must_use]
    pub const fn is_normal(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Message returned to a caller whose account is in this state.
    #[must_use]
    pub const fn denial_message(self) -> &'static str {
        match self {
            Self::Normal => "account is active",
            Self::Deleted => "account has been deleted",
            Self::Flagged => "account is restricted by risk control, please contact support",
            Self::Frozen => "account is frozen",
            Self::Unknown(_) => "account status is abnormal",
        }
    }
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            Self::Deleted => f.write_str("deleted"),
            Self::Flagged => f.write_str("flagged"),
            Self::Frozen => f.write_str("frozen"),
            Self::Unknown(value) => write!(f, "unknown({value})"),
        }
    }
}

impl Serialize for IdentityStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub phone: Option<String>,
    pub password_hash: String,
    pub status: IdentityStatus,
}

impl Identity {
    /// Token subject for this identity.
    #[must_use]
    pub fn subject(&self) -> String {
        self.id.to_string()
    }
}

// Keep the digest out of logs.
impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("phone", &self.phone)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<'r> FromRow<'r, PgRow> for Identity {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            phone: row.try_get("phone")?,
            password_hash: row.try_get("password_hash")?,
            status: IdentityStatus::from_db(row.try_get("state")?),
        })
    }
}
