use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Timestamptz;

/// Role hierarchy, `owner > admin > user`. This is the single source of
/// truth the request authenticator's guards compose on top of (resolving
/// the "hardcoded role lists vs hierarchy constant" open question by
/// deriving every guard from `Role::at_least`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Owner,
}

impl Role {
    /// True when `self` has at least the privilege of `required`.
    pub fn at_least(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::User => "user",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Role {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            _ => Err(()),
        }
    }
}

/// A `users` row. Lockout state (`failed_login_attempts`, `locked_until`)
/// lives here as row attributes rather than in any in-process counter, per
/// the "global mutable lockout counters" redesign note.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<Timestamptz>,
    pub last_login_at: Option<Timestamptz>,
    pub created_at: Timestamptz,
    pub updated_at: Timestamptz,
}

impl User {
    pub fn is_locked(&self, now: time::OffsetDateTime) -> bool {
        self.locked_until.is_some_and(|until| until.0 > now)
    }
}

/// Public-facing identity shape returned from auth endpoints — never
/// includes the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserIdentity {
    fn from(u: &User) -> Self {
        UserIdentity {
            user_id: u.user_id,
            org_id: u.org_id,
            email: u.email.clone(),
            role: u.role,
        }
    }
}
