use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use std::str::FromStr;

use super::{get_optional_timestamp, get_parsed, get_timestamp};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub status: NotificationStatus,
    pub event_id: Option<i64>,
    /// None means broadcast to everyone
    pub user_id: Option<i64>,
    pub sent_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, SqliteRow> for Notification {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            notification_type: get_parsed(row, "notification_type")?,
            status: get_parsed(row, "status")?,
            event_id: row.try_get("event_id")?,
            user_id: row.try_get("user_id")?,
            sent_at: get_timestamp(row, "sent_at")?,
            read_at: get_optional_timestamp(row, "read_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub title: String,
    pub message: String,
    pub notification_type: NotificationType,
    pub event_id: Option<i64>,
    pub user_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    EmergencyAlert,
    EventDetected,
    SystemAlert,
    UserAction,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::EmergencyAlert => "EMERGENCY_ALERT",
            NotificationType::EventDetected => "EVENT_DETECTED",
            NotificationType::SystemAlert => "SYSTEM_ALERT",
            NotificationType::UserAction => "USER_ACTION",
        }
    }
}

impl FromStr for NotificationType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMERGENCY_ALERT" => Ok(NotificationType::EmergencyAlert),
            "EVENT_DETECTED" => Ok(NotificationType::EventDetected),
            "SYSTEM_ALERT" => Ok(NotificationType::SystemAlert),
            "USER_ACTION" => Ok(NotificationType::UserAction),
            other => Err(Error::field("type", format!("Invalid notification type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Sent,
    Read,
    Dismissed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Read => "READ",
            NotificationStatus::Dismissed => "DISMISSED",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SENT" => Ok(NotificationStatus::Sent),
            "READ" => Ok(NotificationStatus::Read),
            "DISMISSED" => Ok(NotificationStatus::Dismissed),
            other => Err(Error::field(
                "status",
                format!("Invalid notification status: {}", other),
            )),
        }
    }
}
