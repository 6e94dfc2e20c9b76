use crate::error::Error;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;
use std::str::FromStr;

use super::get_parsed;

pub const TIME_FORMAT: &str = "%H:%M:%S";

/// Deployment-wide detection settings (single row)
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub id: i64,
    pub noise_threshold: f64,
    pub scream_threshold: f64,
    pub alert_enabled: bool,
    pub detect_mode: DetectMode,
    pub active_start: NaiveTime,
    pub active_end: NaiveTime,
    pub retention_days: i32,
}

impl Settings {
    /// Whether alerts should fire at the given local wall-clock time.
    /// A window whose end precedes its start wraps past midnight.
    pub fn is_active_at(&self, time: NaiveTime) -> bool {
        match self.detect_mode {
            DetectMode::Always => true,
            DetectMode::Scheduled => {
                let time = time.with_nanosecond(0).unwrap_or(time);
                if self.active_start <= self.active_end {
                    time >= self.active_start && time <= self.active_end
                } else {
                    time >= self.active_start || time <= self.active_end
                }
            }
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: 0,
            noise_threshold: 0.7,
            scream_threshold: 0.8,
            alert_enabled: true,
            detect_mode: DetectMode::Always,
            active_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            active_end: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or_default(),
            retention_days: 30,
        }
    }
}

impl<'r> FromRow<'r, SqliteRow> for Settings {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            noise_threshold: row.try_get("noise_threshold")?,
            scream_threshold: row.try_get("scream_threshold")?,
            alert_enabled: row.try_get("alert_enabled")?,
            detect_mode: get_parsed(row, "detect_mode")?,
            active_start: get_time(row, "active_start")?,
            active_end: get_time(row, "active_end")?,
            retention_days: row.try_get("retention_days")?,
        })
    }
}

fn get_time(row: &SqliteRow, column: &str) -> Result<NaiveTime, sqlx::Error> {
    use sqlx::Row;

    let raw: String = row.try_get(column)?;
    NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectMode {
    Always,
    Scheduled,
}

impl DetectMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectMode::Always => "ALWAYS",
            DetectMode::Scheduled => "SCHEDULED",
        }
    }
}

impl FromStr for DetectMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALWAYS" => Ok(DetectMode::Always),
            "SCHEDULED" => Ok(DetectMode::Scheduled),
            other => Err(Error::field(
                "detectMode",
                format!("Invalid detectMode: {}. Valid modes are: ALWAYS, SCHEDULED", other),
            )),
        }
    }
}

/// Partial settings update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub noise_threshold: Option<f64>,
    pub scream_threshold: Option<f64>,
    pub alert_enabled: Option<bool>,
    pub detect_mode: Option<String>,
    pub active_start: Option<NaiveTime>,
    pub active_end: Option<NaiveTime>,
    pub retention_days: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn always_mode_ignores_window() {
        let settings = Settings::default();
        assert!(settings.is_active_at(at(3, 0)));
    }

    #[test]
    fn scheduled_window_is_inclusive() {
        let settings = Settings {
            detect_mode: DetectMode::Scheduled,
            ..Settings::default()
        };
        assert!(settings.is_active_at(at(9, 0)));
        assert!(settings.is_active_at(at(18, 0)));
        assert!(!settings.is_active_at(at(18, 1)));
        assert!(!settings.is_active_at(at(8, 59)));
    }

    #[test]
    fn overnight_window_wraps() {
        let settings = Settings {
            detect_mode: DetectMode::Scheduled,
            active_start: at(22, 0),
            active_end: at(6, 0),
            ..Settings::default()
        };
        assert!(settings.is_active_at(at(23, 30)));
        assert!(settings.is_active_at(at(2, 0)));
        assert!(!settings.is_active_at(at(12, 0)));
    }
}
