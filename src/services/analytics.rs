use crate::db::models::event_models::{Event, EventType};
use crate::db::repositories::events::EventsRepository;
use crate::error::Error;
use crate::services::events::day_bound;
use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDate, Timelike, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_events: usize,
    pub emergency_events: usize,
    pub false_alarms: usize,
    /// Mean minutes from detection to acknowledgment
    pub response_time: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HourBucket {
    pub hour: u32,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationShare {
    pub location: String,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TypeShare {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub events: usize,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub summary: Summary,
    pub events_by_hour: Vec<HourBucket>,
    pub events_by_location: Vec<LocationShare>,
    pub events_by_type: Vec<TypeShare>,
    pub weekly_trend: Vec<DailyCount>,
}

/// A rendered export ready to send as an attachment
#[derive(Debug, Clone)]
pub struct Export {
    pub content_type: &'static str,
    pub filename: String,
    pub body: String,
}

/// Read-only statistics over the event store
#[derive(Clone)]
pub struct AnalyticsService {
    repo: EventsRepository,
}

impl AnalyticsService {
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self {
            repo: EventsRepository::new(pool),
        }
    }

    /// Statistics for the requested range, trailing 7 days by default
    pub async fn report(&self, start_date: Option<&str>, end_date: Option<&str>) -> Result<AnalyticsReport> {
        let now = Local::now();
        let (start, end) = resolve_range(start_date, end_date, now)?;
        let events = self.repo.get_by_time_range(start, end).await?;

        debug!("Computing analytics over {} events", events.len());

        Ok(compute(&events, start, end, now))
    }

    /// Render the report (`json`) or the raw events (`csv`) for download
    pub async fn export(&self, format: &str, start_date: Option<&str>, end_date: Option<&str>) -> Result<Export> {
        let format = format.trim().to_ascii_lowercase();
        if format != "json" && format != "csv" {
            return Err(Error::field(
                "format",
                format!("Unsupported export format: {}. Use json or csv", format),
            )
            .into());
        }

        let now = Local::now();
        let (start, end) = resolve_range(start_date, end_date, now)?;
        let events = self.repo.get_by_time_range(start, end).await?;
        let stamp = now.format("%Y%m%d%H%M%S");

        if format == "json" {
            let report = compute(&events, start, end, now);
            let body = serde_json::to_string_pretty(&report)
                .map_err(|e| Error::Internal(format!("Failed to render report: {}", e)))?;
            Ok(Export {
                content_type: "application/json",
                filename: format!("alertory_report_{}.json", stamp),
                body,
            })
        } else {
            Ok(Export {
                content_type: "text/csv",
                filename: format!("alertory_events_{}.csv", stamp),
                body: events_csv(&events),
            })
        }
    }
}

/// Resolve optional `YYYY-MM-DD` bounds to an instant range
pub fn resolve_range(
    start_date: Option<&str>,
    end_date: Option<&str>,
    now: DateTime<Local>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), Error> {
    let start = match start_date.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => day_bound("startDate", parse_date("startDate", value)?, false)?,
        None => (now - Duration::days(7)).with_timezone(&Utc),
    };
    let end = match end_date.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => day_bound("endDate", parse_date("endDate", value)?, true)?,
        None => now.with_timezone(&Utc),
    };

    if start > end {
        return Err(Error::field("startDate", "startDate must not be after endDate"));
    }

    Ok((start, end))
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| Error::field(field, format!("Invalid {}: {}. Expected YYYY-MM-DD", field, value)))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round1(count as f64 * 100.0 / total as f64)
    }
}

/// Aggregate events; `now` anchors the trailing daily trend
pub fn compute(
    events: &[Event],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Local>,
) -> AnalyticsReport {
    let total = events.len();

    let response_minutes: Vec<f64> = events
        .iter()
        .filter_map(|e| e.acknowledged_at.map(|at| (at - e.detected_at).num_seconds() as f64 / 60.0))
        .collect();
    let response_time = if response_minutes.is_empty() {
        0.0
    } else {
        round1(response_minutes.iter().sum::<f64>() / response_minutes.len() as f64)
    };

    let summary = Summary {
        total_events: total,
        emergency_events: events.iter().filter(|e| e.event_type.is_emergency()).count(),
        false_alarms: events
            .iter()
            .filter(|e| e.event_type == EventType::Normal)
            .count(),
        response_time,
    };

    let mut hours = [0usize; 24];
    for event in events {
        hours[event.detected_at.with_timezone(&Local).hour() as usize] += 1;
    }
    let events_by_hour = hours
        .iter()
        .enumerate()
        .map(|(hour, count)| HourBucket {
            hour: hour as u32,
            count: *count,
        })
        .collect();

    let mut by_location: HashMap<&str, usize> = HashMap::new();
    let mut by_type: HashMap<EventType, usize> = HashMap::new();
    for event in events {
        *by_location.entry(event.location_label.as_str()).or_default() += 1;
        *by_type.entry(event.event_type).or_default() += 1;
    }

    let mut events_by_location: Vec<LocationShare> = by_location
        .into_iter()
        .map(|(location, count)| LocationShare {
            location: location.to_string(),
            count,
            percentage: percentage(count, total),
        })
        .collect();
    events_by_location.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.location.cmp(&b.location)));

    let mut events_by_type: Vec<TypeShare> = by_type
        .into_iter()
        .map(|(event_type, count)| TypeShare {
            event_type,
            count,
            percentage: percentage(count, total),
        })
        .collect();
    events_by_type.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.event_type.cmp(&b.event_type)));

    let today = now.date_naive();
    let weekly_trend = (0..7)
        .rev()
        .map(|days_ago| {
            let date = today - Duration::days(days_ago);
            DailyCount {
                date,
                events: events
                    .iter()
                    .filter(|e| e.detected_at.with_timezone(&Local).date_naive() == date)
                    .count(),
            }
        })
        .collect();

    AnalyticsReport {
        start_date: start,
        end_date: end,
        summary,
        events_by_hour,
        events_by_location,
        events_by_type,
        weekly_trend,
    }
}

/// One row per event in detection order, newest first
pub fn events_csv(events: &[Event]) -> String {
    let mut out = String::from("id,detectedAt,eventType,locationLabel,confidence,status,acknowledgedAt\n");
    for event in events {
        let row = [
            event.id.to_string(),
            event.detected_at.to_rfc3339(),
            event.event_type.as_str().to_string(),
            csv_field(&event.location_label),
            event.confidence.to_string(),
            event.status.as_str().to_string(),
            event
                .acknowledged_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::event_models::EventStatus;
    use chrono::TimeZone;

    fn at_local(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Local
            .with_ymd_and_hms(y, m, d, h, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn event(id: i64, event_type: EventType, location: &str, detected_at: DateTime<Utc>) -> Event {
        Event {
            id,
            event_type,
            location_label: location.into(),
            confidence: 0.9,
            status: EventStatus::New,
            audio_file_path: None,
            detected_at,
            acknowledged_at: None,
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).earliest().unwrap()
    }

    fn sample() -> Vec<Event> {
        let mut acked = event(1, EventType::Scream, "Hall", at_local(2024, 6, 15, 9));
        acked.status = EventStatus::Acknowledged;
        acked.acknowledged_at = Some(acked.detected_at + Duration::seconds(90));

        let mut slow = event(2, EventType::HelpRequest, "Hall", at_local(2024, 6, 14, 9));
        slow.status = EventStatus::Acknowledged;
        slow.acknowledged_at = Some(slow.detected_at + Duration::seconds(210));

        vec![
            acked,
            slow,
            event(3, EventType::Normal, "Yard", at_local(2024, 6, 10, 22)),
        ]
    }

    #[test]
    fn summary_and_buckets() {
        let events = sample();
        let report = compute(&events, at_local(2024, 6, 8, 0), at_local(2024, 6, 15, 12), now());

        assert_eq!(report.summary.total_events, 3);
        assert_eq!(report.summary.emergency_events, 2);
        assert_eq!(report.summary.false_alarms, 1);
        // (1.5 + 3.5) / 2
        assert_eq!(report.summary.response_time, 2.5);

        assert_eq!(report.events_by_hour.len(), 24);
        assert_eq!(report.events_by_hour[9].count, 2);
        assert_eq!(report.events_by_hour[22].count, 1);

        assert_eq!(report.events_by_location[0].location, "Hall");
        assert_eq!(report.events_by_location[0].percentage, 66.7);
        assert_eq!(report.events_by_location[1].percentage, 33.3);
        let sum: f64 = report.events_by_type.iter().map(|t| t.percentage).sum();
        assert!((sum - 100.0).abs() < 0.5);
    }

    #[test]
    fn weekly_trend_is_oldest_first() {
        let events = sample();
        let report = compute(&events, at_local(2024, 6, 8, 0), at_local(2024, 6, 15, 12), now());

        let dates: Vec<String> = report.weekly_trend.iter().map(|d| d.date.to_string()).collect();
        assert_eq!(dates.first().unwrap(), "2024-06-09");
        assert_eq!(dates.last().unwrap(), "2024-06-15");
        let counts: Vec<usize> = report.weekly_trend.iter().map(|d| d.events).collect();
        assert_eq!(counts, vec![0, 1, 0, 0, 0, 1, 1]);
    }

    #[test]
    fn empty_input_is_all_zero() {
        let report = compute(&[], at_local(2024, 6, 8, 0), at_local(2024, 6, 15, 12), now());
        assert_eq!(report.summary.total_events, 0);
        assert_eq!(report.summary.response_time, 0.0);
        assert!(report.events_by_type.is_empty());
        assert!(report.events_by_hour.iter().all(|b| b.count == 0));
    }

    #[test]
    fn percentages_are_zero_without_events() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 3), 33.3);
    }

    #[test]
    fn range_defaults_and_parsing() {
        let (start, end) = resolve_range(None, None, now()).unwrap();
        assert_eq!((end - start).num_days(), 7);

        let (start, end) = resolve_range(Some("2024-06-01"), Some("2024-06-01"), now()).unwrap();
        assert_eq!((end - start).num_seconds(), 86_399);

        assert!(matches!(
            resolve_range(Some("06/01/2024"), None, now()),
            Err(Error::Validation { field: Some(f), .. }) if f == "startDate"
        ));
        assert!(resolve_range(Some("2024-06-10"), Some("2024-06-01"), now()).is_err());
    }

    #[test]
    fn csv_quotes_awkward_labels() {
        let events = vec![event(4, EventType::Noise, "Hall, \"east\"", at_local(2024, 6, 15, 8))];
        let csv = events_csv(&events);
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,detectedAt,eventType,locationLabel,confidence,status,acknowledgedAt"
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("4,"));
        assert!(row.contains("\"Hall, \"\"east\"\"\""));
        assert!(row.ends_with(",NEW,"));
    }
}
