use crate::db::models::event_models::{Event, EventType};
use crate::db::models::notification_models::{NewNotification, Notification, NotificationType};
use crate::db::models::settings_models::Settings;
use crate::db::repositories::notifications::NotificationsRepository;
use anyhow::Result;
use chrono::NaiveTime;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RECENT_LIMIT: i64 = 20;

/// Append-only alert log
#[derive(Clone)]
pub struct NotificationService {
    repo: NotificationsRepository,
}

impl NotificationService {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self {
            repo: NotificationsRepository::new(pool),
        }
    }

    /// Broadcast alert for an emergency event
    pub async fn create_emergency_alert(&self, event: &Event) -> Result<Notification> {
        let message = format!(
            "{} detected at {} (confidence: {:.1}%)",
            capitalize(event.event_type.display_name()),
            event.location_label,
            event.confidence * 100.0
        );

        self.create(
            "Emergency detected",
            message,
            NotificationType::EmergencyAlert,
            Some(event.id),
        )
        .await
    }

    /// Broadcast alert for a non-emergency event
    pub async fn create_event_alert(&self, event: &Event) -> Result<Notification> {
        let message = format!(
            "{} detected at {}",
            capitalize(event.event_type.display_name()),
            event.location_label
        );

        self.create("Event detected", message, NotificationType::EventDetected, Some(event.id))
            .await
    }

    pub async fn create_system_alert(&self, title: &str, message: &str) -> Result<Notification> {
        self.create(title, message.to_string(), NotificationType::SystemAlert, None)
            .await
    }

    async fn create(
        &self,
        title: &str,
        message: String,
        notification_type: NotificationType,
        event_id: Option<i64>,
    ) -> Result<Notification> {
        let notification = self
            .repo
            .create(&NewNotification {
                title: title.to_string(),
                message,
                notification_type,
                event_id,
                user_id: None,
            })
            .await?;

        info!(
            "Notification {} created ({})",
            notification.id,
            notification_type.as_str()
        );

        Ok(notification)
    }

    /// Mark a notification read. Missing or already read ids are ignored.
    pub async fn mark_as_read(&self, id: i64) -> Result<()> {
        if !self.repo.mark_as_read(id).await? {
            debug!("Notification {} not marked read (missing or already read)", id);
        }
        Ok(())
    }

    /// The 20 most recent notifications
    pub async fn list_recent(&self) -> Result<Vec<Notification>> {
        self.repo.get_recent(RECENT_LIMIT).await
    }

    /// Raise the alert a freshly detected event calls for, if any.
    /// Failures are logged and swallowed so detection never fails on them.
    pub async fn alert_for_event(
        &self,
        event: &Event,
        settings: &Settings,
        local_time: NaiveTime,
    ) -> Option<Notification> {
        if !settings.alert_enabled || !settings.is_active_at(local_time) {
            return None;
        }

        let result = if event.event_type.is_emergency()
            && event.confidence >= settings.scream_threshold
        {
            self.create_emergency_alert(event).await
        } else if event.event_type == EventType::Noise && event.confidence >= settings.noise_threshold
        {
            self.create_event_alert(event).await
        } else {
            return None;
        };

        match result {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!("Failed to create alert for event {}: {:#}", event.id, e);
                None
            }
        }
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
