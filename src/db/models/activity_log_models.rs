use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use super::get_timestamp;

/// Audit trail action labels
pub mod actions {
    pub const LOGIN: &str = "LOGIN";
    pub const LOGOUT: &str = "LOGOUT";
    pub const SETTINGS_CHANGE: &str = "SETTINGS_CHANGE";
    pub const EVENT_ACK: &str = "EVENT_ACK";
    pub const USER_MANAGEMENT: &str = "USER_MANAGEMENT";
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivityLog {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for UserActivityLog {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            username: row.try_get("username")?,
            action: row.try_get("action")?,
            details: row.try_get("details")?,
            ip_address: row.try_get("ip_address")?,
            user_agent: row.try_get("user_agent")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }
}

/// Who performed an action and from where
#[derive(Debug, Clone)]
pub struct ActivityContext {
    pub user_id: i64,
    pub username: String,
    pub ip_address: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct NewActivityLog {
    pub user_id: i64,
    pub username: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: String,
    pub user_agent: String,
}

impl NewActivityLog {
    pub fn new(context: &ActivityContext, action: &str, details: impl Into<String>) -> Self {
        Self {
            user_id: context.user_id,
            username: context.username.clone(),
            action: action.to_string(),
            details: Some(details.into()),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
        }
    }
}
