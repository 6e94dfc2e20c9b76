use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::{get_optional_timestamp, get_parsed, get_timestamp};

/// Stored user account. Never serialized directly; see [`UserResponse`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            role: get_parsed(row, "role")?,
            status: get_parsed(row, "status")?,
            created_at: get_timestamp(row, "created_at")?,
            updated_at: get_timestamp(row, "updated_at")?,
            last_login: get_optional_timestamp(row, "last_login")?,
        })
    }
}

/// User role enum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Manager,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Manager => "MANAGER",
        }
    }
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(UserRole::Admin),
            "MANAGER" => Ok(UserRole::Manager),
            other => Err(Error::field(
                "role",
                format!("Invalid role: {}. Valid roles are: ADMIN, MANAGER", other),
            )),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account approval status. PENDING is the only non-terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Pending,
    Active,
    Rejected,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Pending => "PENDING",
            UserStatus::Active => "ACTIVE",
            UserStatus::Rejected => "REJECTED",
        }
    }

    /// Apply the approval workflow: only PENDING may move, and only to a
    /// terminal state.
    pub fn transition_to(self, target: UserStatus) -> Result<UserStatus, Error> {
        match (self, target) {
            (UserStatus::Pending, UserStatus::Active | UserStatus::Rejected) => Ok(target),
            (current, target) => Err(Error::InvalidStateTransition(format!(
                "User is not in pending status (current: {}, requested: {})",
                current, target
            ))),
        }
    }
}

impl FromStr for UserStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(UserStatus::Pending),
            "ACTIVE" => Ok(UserStatus::Active),
            "REJECTED" => Ok(UserStatus::Rejected),
            other => Err(Error::field(
                "status",
                format!(
                    "Invalid status: {}. Valid statuses are: PENDING, ACTIVE, REJECTED",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire representation of a user
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role,
            status: user.status,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse::from(&user)
    }
}

/// Authentication tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Login credentials; `username` is accepted as an alias of `email`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginCredentials {
    #[serde(alias = "username")]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: String,
}

/// Partial admin update; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_moves_to_terminal_states_only() {
        assert_eq!(
            UserStatus::Pending.transition_to(UserStatus::Active).unwrap(),
            UserStatus::Active
        );
        assert_eq!(
            UserStatus::Pending.transition_to(UserStatus::Rejected).unwrap(),
            UserStatus::Rejected
        );
        assert!(UserStatus::Pending.transition_to(UserStatus::Pending).is_err());
    }

    #[test]
    fn terminal_states_reject_every_transition() {
        for from in [UserStatus::Active, UserStatus::Rejected] {
            for to in [UserStatus::Pending, UserStatus::Active, UserStatus::Rejected] {
                assert!(matches!(
                    from.transition_to(to),
                    Err(Error::InvalidStateTransition(_))
                ));
            }
        }
    }

    #[test]
    fn enum_parsing_is_exact() {
        assert_eq!("ADMIN".parse::<UserRole>().unwrap(), UserRole::Admin);
        assert!(matches!(
            "admin".parse::<UserRole>(),
            Err(Error::Validation { field: Some(f), .. }) if f == "role"
        ));
        assert!(matches!(
            "SUSPENDED".parse::<UserStatus>(),
            Err(Error::Validation { field: Some(f), .. }) if f == "status"
        ));
    }

    #[test]
    fn response_omits_password_hash() {
        let user = User {
            id: 1,
            username: "a@b.c".into(),
            email: "a@b.c".into(),
            password_hash: "$2b$secret".into(),
            name: "A".into(),
            role: UserRole::Manager,
            status: UserStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login: None,
        };
        let json = serde_json::to_string(&UserResponse::from(&user)).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"status\":\"PENDING\""));
        assert!(json.contains("\"role\":\"MANAGER\""));
    }
}
