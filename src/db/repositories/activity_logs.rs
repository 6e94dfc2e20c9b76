use crate::db::models::activity_log_models::{NewActivityLog, UserActivityLog};
use crate::db::models::{now, to_millis};
use crate::error::Error;
use anyhow::Result;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

const LOG_COLUMNS: &str =
    "id, user_id, username, action, details, ip_address, user_agent, created_at";

/// Append-only audit trail
#[derive(Clone)]
pub struct ActivityLogsRepository {
    pool: Arc<SqlitePool>,
}

impl ActivityLogsRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Append an entry inside an open transaction
    pub async fn create_in(
        &self,
        conn: &mut SqliteConnection,
        entry: &NewActivityLog,
    ) -> Result<UserActivityLog> {
        let result = sqlx::query_as::<_, UserActivityLog>(&format!(
            r#"
            INSERT INTO user_activity_logs (user_id, username, action, details, ip_address, user_agent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            LOG_COLUMNS
        ))
        .bind(entry.user_id)
        .bind(&entry.username)
        .bind(&entry.action)
        .bind(&entry.details)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(to_millis(&now()))
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to write activity log: {}", e)))?;

        Ok(result)
    }

    /// Append an entry on its own connection
    pub async fn create(&self, entry: &NewActivityLog) -> Result<UserActivityLog> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::Database(format!("Failed to acquire connection: {}", e)))?;
        self.create_in(&mut conn, entry).await
    }

    /// Page through all entries, newest first
    pub async fn get_page(&self, user_id: Option<i64>, page: u32, size: u32) -> Result<(Vec<UserActivityLog>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_activity_logs WHERE (? IS NULL OR user_id = ?)",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to count activity logs: {}", e)))?;

        let logs = sqlx::query_as::<_, UserActivityLog>(&format!(
            r#"
            SELECT {} FROM user_activity_logs
            WHERE (? IS NULL OR user_id = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            LOG_COLUMNS
        ))
        .bind(user_id)
        .bind(user_id)
        .bind(size as i64)
        .bind(page as i64 * size as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get activity logs: {}", e)))?;

        Ok((logs, total))
    }
}
