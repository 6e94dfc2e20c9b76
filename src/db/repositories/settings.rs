use crate::db::models::settings_models::{Settings, TIME_FORMAT};
use crate::error::Error;
use anyhow::Result;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::info;

const SETTINGS_COLUMNS: &str = "id, noise_threshold, scream_threshold, alert_enabled, detect_mode, active_start, active_end, retention_days";

/// Settings repository; the table holds at most one meaningful row
#[derive(Clone)]
pub struct SettingsRepository {
    pool: Arc<SqlitePool>,
}

impl SettingsRepository {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// First settings row, if any
    pub async fn get_first(&self) -> Result<Option<Settings>> {
        let result = sqlx::query_as::<_, Settings>(&format!(
            "SELECT {} FROM settings ORDER BY id LIMIT 1",
            SETTINGS_COLUMNS
        ))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get settings: {}", e)))?;

        Ok(result)
    }

    /// Insert a settings row; the id on `settings` is ignored
    pub async fn create(&self, settings: &Settings) -> Result<Settings> {
        info!("Creating default settings");

        let result = sqlx::query_as::<_, Settings>(&format!(
            r#"
            INSERT INTO settings (noise_threshold, scream_threshold, alert_enabled, detect_mode, active_start, active_end, retention_days)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            SETTINGS_COLUMNS
        ))
        .bind(settings.noise_threshold)
        .bind(settings.scream_threshold)
        .bind(settings.alert_enabled)
        .bind(settings.detect_mode.as_str())
        .bind(settings.active_start.format(TIME_FORMAT).to_string())
        .bind(settings.active_end.format(TIME_FORMAT).to_string())
        .bind(settings.retention_days)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create settings: {}", e)))?;

        Ok(result)
    }

    /// Update settings inside an open transaction
    pub async fn update_in(&self, conn: &mut SqliteConnection, settings: &Settings) -> Result<Settings> {
        let result = sqlx::query_as::<_, Settings>(&format!(
            r#"
            UPDATE settings
            SET noise_threshold = ?, scream_threshold = ?, alert_enabled = ?, detect_mode = ?,
                active_start = ?, active_end = ?, retention_days = ?
            WHERE id = ?
            RETURNING {}
            "#,
            SETTINGS_COLUMNS
        ))
        .bind(settings.noise_threshold)
        .bind(settings.scream_threshold)
        .bind(settings.alert_enabled)
        .bind(settings.detect_mode.as_str())
        .bind(settings.active_start.format(TIME_FORMAT).to_string())
        .bind(settings.active_end.format(TIME_FORMAT).to_string())
        .bind(settings.retention_days)
        .bind(settings.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to update settings: {}", e)))?
        .ok_or_else(|| Error::NotFound(format!("Settings not found: {}", settings.id)))?;

        Ok(result)
    }
}
