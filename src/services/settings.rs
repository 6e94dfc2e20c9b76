use crate::db::models::activity_log_models::{actions, ActivityContext, NewActivityLog};
use crate::db::models::settings_models::{DetectMode, Settings, UpdateSettingsRequest};
use crate::db::repositories::activity_logs::ActivityLogsRepository;
use crate::db::repositories::settings::SettingsRepository;
use crate::error::Error;
use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Singleton detection settings
#[derive(Clone)]
pub struct SettingsService {
    pool: Arc<SqlitePool>,
    repo: SettingsRepository,
    activity_repo: ActivityLogsRepository,
}

impl SettingsService {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self {
            repo: SettingsRepository::new(pool.clone()),
            activity_repo: ActivityLogsRepository::new(pool.clone()),
            pool,
        }
    }

    /// Current settings, creating the default row on first read
    pub async fn get_or_create(&self) -> Result<Settings> {
        if let Some(settings) = self.repo.get_first().await? {
            return Ok(settings);
        }

        info!("No settings stored yet, creating defaults");
        self.repo.create(&Settings::default()).await
    }

    /// Apply a partial update and record it in the audit trail
    pub async fn update(&self, request: &UpdateSettingsRequest, actor: &ActivityContext) -> Result<Settings> {
        let mut settings = self.get_or_create().await?;
        let mut changes = Vec::new();

        if let Some(value) = request.noise_threshold {
            validate_threshold("noiseThreshold", value)?;
            settings.noise_threshold = value;
            changes.push(format!("noiseThreshold={}", value));
        }
        if let Some(value) = request.scream_threshold {
            validate_threshold("screamThreshold", value)?;
            settings.scream_threshold = value;
            changes.push(format!("screamThreshold={}", value));
        }
        if let Some(value) = request.alert_enabled {
            settings.alert_enabled = value;
            changes.push(format!("alertEnabled={}", value));
        }
        if let Some(value) = &request.detect_mode {
            settings.detect_mode = value.parse::<DetectMode>()?;
            changes.push(format!("detectMode={}", settings.detect_mode.as_str()));
        }
        if let Some(value) = request.active_start {
            settings.active_start = value;
            changes.push(format!("activeStart={}", value));
        }
        if let Some(value) = request.active_end {
            settings.active_end = value;
            changes.push(format!("activeEnd={}", value));
        }
        if let Some(value) = request.retention_days {
            if value <= 0 {
                return Err(Error::field("retentionDays", "retentionDays must be positive").into());
            }
            settings.retention_days = value;
            changes.push(format!("retentionDays={}", value));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = self.repo.update_in(&mut *tx, &settings).await?;
        self.activity_repo
            .create_in(
                &mut *tx,
                &NewActivityLog::new(
                    actor,
                    actions::SETTINGS_CHANGE,
                    format!("Settings updated: {}", changes.join(", ")),
                ),
            )
            .await?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        info!("Settings updated by {}", actor.username);

        Ok(updated)
    }
}

fn validate_threshold(field: &str, value: f64) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::field(field, format!("{} must be between 0 and 1", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use chrono::NaiveTime;

    fn actor() -> ActivityContext {
        ActivityContext {
            user_id: 3,
            username: "ops@site.io".into(),
            ip_address: "127.0.0.1".into(),
            user_agent: "unknown".into(),
        }
    }

    #[tokio::test]
    async fn first_read_creates_defaults_once() {
        let pool = Arc::new(test_pool().await);
        let service = SettingsService::new(pool.clone());

        let first = service.get_or_create().await.unwrap();
        let second = service.get_or_create().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.noise_threshold, 0.7);
        assert_eq!(first.scream_threshold, 0.8);

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&*pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn update_applies_fields_and_audits() {
        let pool = Arc::new(test_pool().await);
        let service = SettingsService::new(pool.clone());

        let updated = service
            .update(
                &UpdateSettingsRequest {
                    scream_threshold: Some(0.95),
                    detect_mode: Some("SCHEDULED".into()),
                    active_start: NaiveTime::from_hms_opt(22, 0, 0),
                    ..UpdateSettingsRequest::default()
                },
                &actor(),
            )
            .await
            .unwrap();

        assert_eq!(updated.scream_threshold, 0.95);
        assert_eq!(updated.detect_mode, DetectMode::Scheduled);
        assert_eq!(updated.noise_threshold, 0.7);
        assert_eq!(service.get_or_create().await.unwrap(), updated);

        let audits: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM user_activity_logs WHERE action = 'SETTINGS_CHANGE'",
        )
        .fetch_one(&*pool)
        .await
        .unwrap();
        assert_eq!(audits, 1);
    }

    #[tokio::test]
    async fn out_of_range_values_are_rejected() {
        let service = SettingsService::new(Arc::new(test_pool().await));

        let err = service
            .update(
                &UpdateSettingsRequest {
                    noise_threshold: Some(1.5),
                    ..UpdateSettingsRequest::default()
                },
                &actor(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Validation { field: Some(f), .. }) if f == "noiseThreshold"
        ));

        let err = service
            .update(
                &UpdateSettingsRequest {
                    retention_days: Some(0),
                    ..UpdateSettingsRequest::default()
                },
                &actor(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Validation { field: Some(f), .. }) if f == "retentionDays"
        ));
    }
}
