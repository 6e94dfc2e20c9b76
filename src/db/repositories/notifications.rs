use crate::db::models::notification_models::{Notification, NotificationStatus, NewNotification};
use crate::db::models::{now, to_millis};
use crate::error::Error;
use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

const NOTIFICATION_COLUMNS: &str =
    "id, title, message, notification_type, status, event_id, user_id, sent_at, read_at";

/// Notifications repository
#[derive(Clone)]
pub struct NotificationsRepository {
    pool: Arc<SqlitePool>,
}

impl NotificationsRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Append a notification in SENT status
    pub async fn create(&self, notification: &NewNotification) -> Result<Notification> {
        let result = sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (title, message, notification_type, status, event_id, user_id, sent_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            NOTIFICATION_COLUMNS
        ))
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.notification_type.as_str())
        .bind(NotificationStatus::Sent.as_str())
        .bind(notification.event_id)
        .bind(notification.user_id)
        .bind(to_millis(&now()))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create notification: {}", e)))?;

        Ok(result)
    }

    /// Mark a SENT notification as read; other rows are left alone
    pub async fn mark_as_read(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = ?, read_at = ? WHERE id = ? AND status = ?",
        )
        .bind(NotificationStatus::Read.as_str())
        .bind(to_millis(&now()))
        .bind(id)
        .bind(NotificationStatus::Sent.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to mark notification as read: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Notification>> {
        let result = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {} FROM notifications WHERE id = ?",
            NOTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get notification: {}", e)))?;

        Ok(result)
    }

    /// Most recent notifications by send time
    pub async fn get_recent(&self, limit: i64) -> Result<Vec<Notification>> {
        let result = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {} FROM notifications ORDER BY sent_at DESC, id DESC LIMIT ?",
            NOTIFICATION_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get notifications: {}", e)))?;

        Ok(result)
    }
}
