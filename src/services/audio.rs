use crate::config::StorageConfig;
use crate::db::models::event_models::{EventType, NewEvent};
use crate::db::models::now;
use crate::db::repositories::events::EventsRepository;
use crate::error::Error;
use crate::services::ai_client::AiClient;
use crate::services::notifications::NotificationService;
use crate::services::settings::SettingsService;
use crate::services::storage::{extension_of, AudioStorage};
use anyhow::Result;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

pub const ALLOWED_EXTENSIONS: [&str; 7] = ["wav", "mp3", "m4a", "flac", "webm", "aac", "ogg"];

/// A clip received from a client
#[derive(Debug, Clone, Default)]
pub struct AudioUpload {
    pub filename: Option<String>,
    pub data: Vec<u8>,
    pub location_label: Option<String>,
}

/// Outcome of a successful analysis
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub success: bool,
    pub event_id: i64,
    pub event_type: EventType,
    pub confidence: f64,
    pub text: String,
    pub description: String,
    pub is_danger: bool,
    pub danger_level: &'static str,
    pub location_label: String,
    pub detected_at: DateTime<Utc>,
    pub audio_file_path: String,
    pub message: String,
}

/// Connectivity report for the inference server
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioHealth {
    pub ai_server: &'static str,
    pub ai_server_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_server_response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_server_error: Option<String>,
    pub upload_dir: String,
    pub max_file_size: String,
    pub allowed_extensions: Vec<&'static str>,
}

/// Upload validation, inference call and event persistence
pub struct AudioAnalysisGateway {
    ai: AiClient,
    storage: AudioStorage,
    events_repo: EventsRepository,
    notifications: NotificationService,
    settings: SettingsService,
    config: StorageConfig,
}

impl AudioAnalysisGateway {
    pub fn new(pool: Arc<SqlitePool>, ai: AiClient, config: &StorageConfig) -> Self {
        Self {
            ai,
            storage: AudioStorage::new(config),
            events_repo: EventsRepository::new(pool.clone()),
            notifications: NotificationService::new(pool.clone()),
            settings: SettingsService::new(pool),
            config: config.clone(),
        }
    }

    /// Validate, store and classify a clip, recording the result as a NEW event
    pub async fn analyze(&self, upload: AudioUpload, requested_by: &str) -> Result<AnalysisResult> {
        let filename = validate_upload(
            upload.filename.as_deref(),
            &upload.data,
            self.config.max_file_size_bytes,
        )?
        .to_string();

        info!(
            "Audio analysis requested by {}: {} ({} KB)",
            requested_by,
            filename,
            upload.data.len() / 1024
        );

        let stored_name = self.storage.save(&filename, &upload.data).await?;
        let prediction = self.ai.predict(&filename, upload.data).await?;

        let location_label = upload
            .location_label
            .map(|label| label.trim().to_string())
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| self.config.default_location_label.clone());

        let event = self
            .events_repo
            .create(&NewEvent {
                event_type: prediction.event_type,
                location_label,
                confidence: prediction.confidence,
                audio_file_path: Some(stored_name.clone()),
                detected_at: now(),
            })
            .await?;

        info!(
            "Event {} recorded: {} ({:.1}%) at {}",
            event.id,
            event.event_type,
            event.confidence * 100.0,
            event.location_label
        );

        match self.settings.get_or_create().await {
            Ok(settings) => {
                self.notifications
                    .alert_for_event(&event, &settings, Local::now().time())
                    .await;
            }
            Err(e) => warn!("Skipping alert for event {}: {:#}", event.id, e),
        }

        Ok(AnalysisResult {
            success: true,
            event_id: event.id,
            event_type: event.event_type,
            confidence: event.confidence,
            description: prediction.text.clone(),
            text: prediction.text,
            is_danger: prediction.is_danger,
            danger_level: if prediction.is_danger { "DANGER" } else { "SAFE" },
            location_label: event.location_label,
            detected_at: event.detected_at,
            audio_file_path: stored_name,
            message: "Audio analysis completed".to_string(),
        })
    }

    /// Probe the inference server. Never fails; problems are reported inline.
    pub async fn health(&self) -> AudioHealth {
        let (ai_server, ai_server_response, ai_server_error) = match self.ai.health().await {
            Ok(body) => ("connected", Some(body), None),
            Err(e) => ("disconnected", None, Some(e.to_string())),
        };

        AudioHealth {
            ai_server,
            ai_server_url: self.ai.url(),
            ai_server_response,
            ai_server_error,
            upload_dir: self.storage.root().display().to_string(),
            max_file_size: format!("{}MB", self.config.max_file_size_bytes / (1024 * 1024)),
            allowed_extensions: ALLOWED_EXTENSIONS.to_vec(),
        }
    }
}

/// Ordered upload checks; the first failure wins. Returns the file name.
pub fn validate_upload<'a>(filename: Option<&'a str>, data: &[u8], max_size: u64) -> Result<&'a str, Error> {
    if data.is_empty() {
        return Err(Error::FileValidation("File is empty or missing".to_string()));
    }

    let filename = filename
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| Error::FileValidation("File name is missing".to_string()))?;

    match extension_of(filename) {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
        other => {
            return Err(Error::FileValidation(format!(
                "Unsupported file type{}. Allowed extensions: {}",
                other.map(|ext| format!(" .{}", ext)).unwrap_or_default(),
                ALLOWED_EXTENSIONS.join(", ")
            )))
        }
    }

    if data.len() as u64 > max_size {
        return Err(Error::FileValidation(format!(
            "File is too large ({:.1} MB). Maximum size is {} MB",
            data.len() as f64 / (1024.0 * 1024.0),
            max_size / (1024 * 1024)
        )));
    }

    Ok(filename)
}
