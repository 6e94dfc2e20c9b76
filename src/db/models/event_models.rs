use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::{get_optional_timestamp, get_parsed, get_timestamp};

/// Detected or reported incident
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub event_type: EventType,
    pub location_label: String,
    /// Always in the 0.0..=1.0 range
    pub confidence: f64,
    pub status: EventStatus,
    /// File name relative to the audio storage root
    pub audio_file_path: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, SqliteRow> for Event {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            event_type: get_parsed(row, "event_type")?,
            location_label: row.try_get("location_label")?,
            confidence: row.try_get("confidence")?,
            status: get_parsed(row, "status")?,
            audio_file_path: row.try_get("audio_file_path")?,
            detected_at: get_timestamp(row, "detected_at")?,
            acknowledged_at: get_optional_timestamp(row, "acknowledged_at")?,
        })
    }
}

/// Event data before it has been assigned an id
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: EventType,
    pub location_label: String,
    pub confidence: f64,
    pub audio_file_path: Option<String>,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Scream,
    Noise,
    Normal,
    HelpRequest,
}

impl EventType {
    pub const ALL: [EventType; 4] = [
        EventType::Scream,
        EventType::HelpRequest,
        EventType::Noise,
        EventType::Normal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Scream => "SCREAM",
            EventType::Noise => "NOISE",
            EventType::Normal => "NORMAL",
            EventType::HelpRequest => "HELP_REQUEST",
        }
    }

    /// Screams and help requests count as emergencies
    pub fn is_emergency(&self) -> bool {
        matches!(self, EventType::Scream | EventType::HelpRequest)
    }

    /// Human readable label used in alert messages
    pub fn display_name(&self) -> &'static str {
        match self {
            EventType::Scream => "scream",
            EventType::Noise => "abnormal noise",
            EventType::Normal => "normal sound",
            EventType::HelpRequest => "help request",
        }
    }
}

impl FromStr for EventType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCREAM" => Ok(EventType::Scream),
            "NOISE" => Ok(EventType::Noise),
            "NORMAL" => Ok(EventType::Normal),
            "HELP_REQUEST" => Ok(EventType::HelpRequest),
            other => Err(Error::field(
                "eventType",
                format!(
                    "Invalid eventType: {}. Valid types are: SCREAM, HELP_REQUEST, NOISE, NORMAL",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventStatus {
    New,
    Acknowledged,
    Resolved,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "NEW",
            EventStatus::Acknowledged => "ACKNOWLEDGED",
            EventStatus::Resolved => "RESOLVED",
        }
    }
}

impl FromStr for EventStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(EventStatus::New),
            "ACKNOWLEDGED" => Ok(EventStatus::Acknowledged),
            "RESOLVED" => Ok(EventStatus::Resolved),
            other => Err(Error::field(
                "status",
                format!(
                    "Invalid status: {}. Valid statuses are: NEW, ACKNOWLEDGED, RESOLVED",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire representation of an event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub id: i64,
    pub event_type: EventType,
    pub location_label: String,
    pub confidence: f64,
    pub status: EventStatus,
    pub has_audio: bool,
    pub audio_file_path: Option<String>,
    pub detected_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            event_type: event.event_type,
            location_label: event.location_label,
            confidence: event.confidence,
            status: event.status,
            has_audio: event.audio_file_path.is_some(),
            audio_file_path: event.audio_file_path,
            detected_at: event.detected_at,
            acknowledged_at: event.acknowledged_at,
        }
    }
}

/// Manual event creation body. Fields are optional so missing values
/// surface as field-tagged validation errors rather than parse failures.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub event_type: Option<String>,
    pub location_label: Option<String>,
    pub confidence: Option<f64>,
}

/// Raw event list query parameters
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    pub event_type: Option<String>,
    pub status: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

/// Event list filters
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub status: Option<EventStatus>,
    pub location: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

/// One page of results
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: u32, size: u32, total_elements: i64) -> Self {
        let total_pages = if size == 0 {
            0
        } else {
            (total_elements + size as i64 - 1) / size as i64
        };
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
        }
    }
}
