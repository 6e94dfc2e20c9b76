use crate::db::models::activity_log_models::{actions, ActivityContext, NewActivityLog};
use crate::db::models::event_models::{
    CreateEventRequest, Event, EventFilter, EventQuery, EventStatus, EventType, NewEvent, Page,
};
use crate::db::models::now;
use crate::db::repositories::activity_logs::ActivityLogsRepository;
use crate::db::repositories::events::EventsRepository;
use crate::error::Error;
use crate::services::page_params;
use crate::services::storage::{extension_of, AudioStorage};
use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Audio attached to an event, ready to serve
#[derive(Debug)]
pub struct EventAudio {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Incident records: manual creation, search and acknowledgment
#[derive(Clone)]
pub struct EventService {
    pool: Arc<SqlitePool>,
    repo: EventsRepository,
    activity_repo: ActivityLogsRepository,
    storage: AudioStorage,
}

impl EventService {
    pub fn new(pool: Arc<SqlitePool>, storage: AudioStorage) -> Self {
        Self {
            repo: EventsRepository::new(pool.clone()),
            activity_repo: ActivityLogsRepository::new(pool.clone()),
            pool,
            storage,
        }
    }

    /// Record a manually reported event
    pub async fn create(&self, request: &CreateEventRequest) -> Result<Event> {
        let event_type = request
            .event_type
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::field("eventType", "eventType is required"))?
            .parse::<EventType>()?;

        let location_label = request
            .location_label
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| Error::field("locationLabel", "locationLabel must not be blank"))?
            .to_string();

        let confidence = request
            .confidence
            .ok_or_else(|| Error::field("confidence", "confidence is required"))?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::field(
                "confidence",
                format!("confidence must be between 0 and 1, got {}", confidence),
            )
            .into());
        }

        let event = self
            .repo
            .create(&NewEvent {
                event_type,
                location_label,
                confidence,
                audio_file_path: None,
                detected_at: now(),
            })
            .await?;

        info!("Event {} created manually ({})", event.id, event.event_type);

        Ok(event)
    }

    /// Filtered page of events, newest first
    pub async fn list(&self, query: &EventQuery) -> Result<Page<Event>> {
        let filter = EventFilter {
            event_type: query
                .event_type
                .as_deref()
                .filter(|value| !value.is_empty())
                .map(str::parse::<EventType>)
                .transpose()?,
            status: query
                .status
                .as_deref()
                .filter(|value| !value.is_empty())
                .map(str::parse::<EventStatus>)
                .transpose()?,
            location: query.location.clone().filter(|value| !value.is_empty()),
            start_date: query
                .start_date
                .as_deref()
                .map(|value| parse_query_time("startDate", value, false))
                .transpose()?,
            end_date: query
                .end_date
                .as_deref()
                .map(|value| parse_query_time("endDate", value, true))
                .transpose()?,
        };

        let (page, size) = page_params(query.page, query.size);
        let (events, total) = self.repo.search(&filter, page, size).await?;

        Ok(Page::new(events, page, size, total))
    }

    pub async fn get(&self, id: i64) -> Result<Event> {
        let event = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Event not found: {}", id)))?;

        Ok(event)
    }

    /// Acknowledge a NEW event. Events already past NEW come back unchanged.
    pub async fn acknowledge(&self, id: i64, actor: &ActivityContext) -> Result<Event> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        match self.repo.acknowledge_in(&mut *tx, id, now()).await? {
            Some(event) => {
                self.activity_repo
                    .create_in(
                        &mut *tx,
                        &NewActivityLog::new(
                            actor,
                            actions::EVENT_ACK,
                            format!("Event {} acknowledged ({})", event.id, event.event_type),
                        ),
                    )
                    .await?;

                tx.commit()
                    .await
                    .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

                info!("Event {} acknowledged by {}", event.id, actor.username);

                Ok(event)
            }
            None => {
                // Nothing changed; release the connection before reading.
                drop(tx);
                self.get(id).await
            }
        }
    }

    /// Load the audio clip attached to an event
    pub async fn download_audio(&self, id: i64) -> Result<EventAudio> {
        let event = self.get(id).await?;
        let stored_name = event
            .audio_file_path
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::NotFound(format!("Event {} has no audio", id)))?;

        let data = self.storage.read(&stored_name).await?;
        let ext = extension_of(&stored_name).unwrap_or_else(|| "wav".to_string());

        Ok(EventAudio {
            filename: format!("event_{}_audio.{}", id, ext),
            data,
        })
    }

    /// NEW / ACKNOWLEDGED totals, optionally for one location
    pub async fn status_counts(&self, location: Option<&str>) -> Result<(i64, i64)> {
        let counts = self.repo.count_by_status(location).await?;
        let of = |status: EventStatus| {
            counts
                .iter()
                .filter(|(s, _)| *s == status)
                .map(|(_, count)| *count)
                .sum::<i64>()
        };
        Ok((of(EventStatus::New), of(EventStatus::Acknowledged)))
    }

    pub async fn recent(&self, location: Option<&str>, limit: i64) -> Result<Vec<Event>> {
        self.repo.get_recent(location, limit).await
    }
}

/// Accept RFC 3339, local `YYYY-MM-DDTHH:MM:SS`, or a bare local date which
/// expands to the start or end of that day.
pub(crate) fn parse_query_time(field: &str, value: &str, end_of_day: bool) -> Result<DateTime<Utc>, Error> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return local_to_utc(field, naive);
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return day_bound(field, date, end_of_day);
    }

    Err(Error::field(
        field,
        format!("Invalid {}: {}. Expected YYYY-MM-DD or an ISO date-time", field, value),
    ))
}

/// Local start of day, or 23:59:59 local when `end_of_day`
pub(crate) fn day_bound(field: &str, date: NaiveDate, end_of_day: bool) -> Result<DateTime<Utc>, Error> {
    let time = if end_of_day {
        NaiveTime::from_hms_opt(23, 59, 59)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| Error::Internal("Invalid time of day".to_string()))?;

    local_to_utc(field, date.and_time(time))
}

fn local_to_utc(field: &str, naive: NaiveDateTime) -> Result<DateTime<Utc>, Error> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
        .ok_or_else(|| Error::field(field, format!("{} does not exist in local time", naive)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use crate::db::test_pool;

    fn actor() -> ActivityContext {
        ActivityContext {
            user_id: 5,
            username: "ops@site.io".into(),
            ip_address: "127.0.0.1".into(),
            user_agent: "unknown".into(),
        }
    }

    async fn service(dir: &tempfile::TempDir) -> (EventService, Arc<SqlitePool>) {
        let pool = Arc::new(test_pool().await);
        let storage = AudioStorage::new(&StorageConfig {
            audio_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        });
        (EventService::new(pool.clone(), storage), pool)
    }

    fn request(event_type: &str, location: &str, confidence: f64) -> CreateEventRequest {
        CreateEventRequest {
            event_type: Some(event_type.into()),
            location_label: Some(location.into()),
            confidence: Some(confidence),
        }
    }

    fn field_of(err: &anyhow::Error) -> Option<String> {
        match err.downcast_ref::<Error>() {
            Some(Error::Validation { field, .. }) => field.clone(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn create_validates_each_field() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(&dir).await;

        let event = service.create(&request("SCREAM", "Hall", 0.9)).await.unwrap();
        assert_eq!(event.status, EventStatus::New);
        assert!(event.acknowledged_at.is_none());

        let err = service.create(&request("BARK", "Hall", 0.9)).await.unwrap_err();
        assert_eq!(field_of(&err).as_deref(), Some("eventType"));

        let err = service.create(&request("NOISE", "   ", 0.9)).await.unwrap_err();
        assert_eq!(field_of(&err).as_deref(), Some("locationLabel"));

        let err = service.create(&request("NOISE", "Hall", 1.2)).await.unwrap_err();
        assert_eq!(field_of(&err).as_deref(), Some("confidence"));

        let err = service
            .create(&CreateEventRequest {
                confidence: None,
                ..request("NOISE", "Hall", 0.0)
            })
            .await
            .unwrap_err();
        assert_eq!(field_of(&err).as_deref(), Some("confidence"));
    }

    #[tokio::test]
    async fn list_filters_and_caps_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service(&dir).await;
        service.create(&request("SCREAM", "Hall", 0.9)).await.unwrap();
        service.create(&request("NOISE", "Hall", 0.5)).await.unwrap();
        service.create(&request("SCREAM", "Yard", 0.8)).await.unwrap();

        let page = service
            .list(&EventQuery {
                event_type: Some("SCREAM".into()),
                page: Some(0),
                size: Some(500),
                ..EventQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(page.size, 100);
        assert_eq!(page.total_elements, 2);
        assert!(page.content.iter().all(|e| e.event_type == EventType::Scream));
        assert!(page.content[0].id > page.content[1].id);

        let err = service
            .list(&EventQuery {
                status: Some("DONE".into()),
                ..EventQuery::default()
            })
            .await
            .unwrap_err();
        assert_eq!(field_of(&err).as_deref(), Some("status"));
    }

    #[tokio::test]
    async fn acknowledge_is_idempotent_and_audited_once() {
        let dir = tempfile::tempdir().unwrap();
        let (service, pool) = service(&dir).await;
        let event = service.create(&request("SCREAM", "Hall", 0.9)).await.unwrap();

        let first = service.acknowledge(event.id, &actor()).await.unwrap();
        assert_eq!(first.status, EventStatus::Acknowledged);
        let at = first.acknowledged_at.unwrap();

        let second = service.acknowledge(event.id, &actor()).await.unwrap();
        assert_eq!(second.status, EventStatus::Acknowledged);
        assert_eq!(second.acknowledged_at, Some(at));

        let audits: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_activity_logs WHERE action = 'EVENT_ACK'")
                .fetch_one(&*pool)
                .await
                .unwrap();
        assert_eq!(audits, 1);

        let err = service.acknowledge(999, &actor()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn download_requires_stored_audio() {
        let dir = tempfile::tempdir().unwrap();
        let (service, pool) = service(&dir).await;

        let manual = service.create(&request("NOISE", "Hall", 0.5)).await.unwrap();
        let err = service.download_audio(manual.id).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));

        let storage = AudioStorage::new(&StorageConfig {
            audio_dir: dir.path().to_path_buf(),
            ..StorageConfig::default()
        });
        let stored = storage.save("clip.mp3", b"ID3").await.unwrap();
        let repo = EventsRepository::new(pool.clone());
        let with_audio = repo
            .create(&NewEvent {
                event_type: EventType::Scream,
                location_label: "Hall".into(),
                confidence: 0.9,
                audio_file_path: Some(stored),
                detected_at: now(),
            })
            .await
            .unwrap();

        let audio = service.download_audio(with_audio.id).await.unwrap();
        assert_eq!(audio.filename, format!("event_{}_audio.mp3", with_audio.id));
        assert_eq!(audio.data, b"ID3");

        let escaping = repo
            .create(&NewEvent {
                event_type: EventType::Scream,
                location_label: "Hall".into(),
                confidence: 0.9,
                audio_file_path: Some("../../etc/passwd".into()),
                detected_at: now(),
            })
            .await
            .unwrap();
        let err = service.download_audio(escaping.id).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
    }

    #[test]
    fn query_times_accept_dates_and_datetimes() {
        let start = parse_query_time("startDate", "2024-03-01", false).unwrap();
        let end = parse_query_time("endDate", "2024-03-01", true).unwrap();
        assert_eq!((end - start).num_seconds(), 86_399);

        let rfc = parse_query_time("startDate", "2024-03-01T10:00:00Z", false).unwrap();
        assert_eq!(rfc.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert!(parse_query_time("startDate", "2024-03-01T10:00:00", false).is_ok());

        assert!(matches!(
            parse_query_time("endDate", "yesterday", true),
            Err(Error::Validation { field: Some(f), .. }) if f == "endDate"
        ));
    }
}
