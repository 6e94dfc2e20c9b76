use crate::db::models::event_models::{Event, EventFilter, EventStatus, NewEvent};
use crate::db::models::to_millis;
use crate::error::Error;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;

const EVENT_COLUMNS: &str = "id, event_type, location_label, confidence, status, audio_file_path, detected_at, acknowledged_at";

/// Events repository for handling event operations
#[derive(Clone)]
pub struct EventsRepository {
    pool: Arc<SqlitePool>,
}

impl EventsRepository {
    /// Create a new events repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Create a new event in NEW status
    pub async fn create(&self, event: &NewEvent) -> Result<Event> {
        let result = sqlx::query_as::<_, Event>(&format!(
            r#"
            INSERT INTO events (event_type, location_label, confidence, status, audio_file_path, detected_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(event.event_type.as_str())
        .bind(&event.location_label)
        .bind(event.confidence)
        .bind(EventStatus::New.as_str())
        .bind(&event.audio_file_path)
        .bind(to_millis(&event.detected_at))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create event: {}", e)))?;

        Ok(result)
    }

    /// Get event by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Event>> {
        let result = sqlx::query_as::<_, Event>(&format!(
            "SELECT {} FROM events WHERE id = ?",
            EVENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get event by ID: {}", e)))?;

        Ok(result)
    }

    /// Move a NEW event to ACKNOWLEDGED. Returns None when the row is missing
    /// or no longer NEW, so concurrent callers never overwrite the first
    /// acknowledgment time.
    pub async fn acknowledge_in(
        &self,
        conn: &mut SqliteConnection,
        id: i64,
        acknowledged_at: DateTime<Utc>,
    ) -> Result<Option<Event>> {
        let result = sqlx::query_as::<_, Event>(&format!(
            r#"
            UPDATE events
            SET status = ?, acknowledged_at = ?
            WHERE id = ? AND status = ?
            RETURNING {}
            "#,
            EVENT_COLUMNS
        ))
        .bind(EventStatus::Acknowledged.as_str())
        .bind(to_millis(&acknowledged_at))
        .bind(id)
        .bind(EventStatus::New.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| Error::Database(format!("Failed to acknowledge event: {}", e)))?;

        Ok(result)
    }

    /// Search events with combined filters, newest first
    pub async fn search(&self, filter: &EventFilter, page: u32, size: u32) -> Result<(Vec<Event>, i64)> {
        let mut count_query = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM events WHERE 1=1");
        push_filters(&mut count_query, filter);

        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count events: {}", e)))?;

        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM events WHERE 1=1", EVENT_COLUMNS));
        push_filters(&mut query, filter);
        query.push(" ORDER BY detected_at DESC, id DESC LIMIT ");
        query.push_bind(size as i64);
        query.push(" OFFSET ");
        query.push_bind(page as i64 * size as i64);

        let events = query
            .build_query_as::<Event>()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search events: {}", e)))?;

        Ok((events, total))
    }

    /// Get events detected within [start, end], newest first
    pub async fn get_by_time_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<Event>> {
        let result = sqlx::query_as::<_, Event>(&format!(
            r#"
            SELECT {} FROM events
            WHERE detected_at >= ? AND detected_at <= ?
            ORDER BY detected_at DESC
            "#,
            EVENT_COLUMNS
        ))
        .bind(to_millis(&start))
        .bind(to_millis(&end))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get events in time range: {}", e)))?;

        Ok(result)
    }

    /// Most recent events, optionally for one location
    pub async fn get_recent(&self, location: Option<&str>, limit: i64) -> Result<Vec<Event>> {
        let mut query =
            QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM events WHERE 1=1", EVENT_COLUMNS));
        if let Some(location) = location {
            query.push(" AND location_label = ").push_bind(location);
        }
        query.push(" ORDER BY detected_at DESC, id DESC LIMIT ").push_bind(limit);

        let result = query
            .build_query_as::<Event>()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get recent events: {}", e)))?;

        Ok(result)
    }

    /// Count events per status, optionally for one location
    pub async fn count_by_status(&self, location: Option<&str>) -> Result<Vec<(EventStatus, i64)>> {
        let mut query =
            QueryBuilder::<Sqlite>::new("SELECT status, COUNT(*) FROM events WHERE 1=1");
        if let Some(location) = location {
            query.push(" AND location_label = ").push_bind(location);
        }
        query.push(" GROUP BY status");

        let rows: Vec<(String, i64)> = query
            .build_query_as()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count events: {}", e)))?;

        rows.into_iter()
            .map(|(status, count)| Ok((status.parse::<EventStatus>()?, count)))
            .collect()
    }
}

fn push_filters(query: &mut QueryBuilder<'_, Sqlite>, filter: &EventFilter) {
    if let Some(event_type) = filter.event_type {
        query.push(" AND event_type = ").push_bind(event_type.as_str());
    }
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(location) = &filter.location {
        query.push(" AND location_label = ").push_bind(location.clone());
    }
    if let Some(start) = &filter.start_date {
        query.push(" AND detected_at >= ").push_bind(to_millis(start));
    }
    if let Some(end) = &filter.end_date {
        query.push(" AND detected_at <= ").push_bind(to_millis(end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::event_models::EventType;
    use crate::db::test_pool;
    use chrono::Duration;

    fn new_event(event_type: EventType, location: &str, minutes_ago: i64) -> NewEvent {
        NewEvent {
            event_type,
            location_label: location.to_string(),
            confidence: 0.9,
            audio_file_path: None,
            detected_at: crate::db::models::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn search_filters_and_orders_newest_first() {
        let repo = EventsRepository::new(Arc::new(test_pool().await));
        repo.create(&new_event(EventType::Scream, "A-1", 30)).await.unwrap();
        repo.create(&new_event(EventType::Noise, "A-1", 20)).await.unwrap();
        repo.create(&new_event(EventType::Scream, "B-2", 10)).await.unwrap();

        let filter = EventFilter {
            event_type: Some(EventType::Scream),
            ..EventFilter::default()
        };
        let (events, total) = repo.search(&filter, 0, 20).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == EventType::Scream));
        assert!(events[0].detected_at > events[1].detected_at);

        let filter = EventFilter {
            event_type: Some(EventType::Scream),
            location: Some("A-1".into()),
            ..EventFilter::default()
        };
        let (events, total) = repo.search(&filter, 0, 20).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(events[0].location_label, "A-1");
    }

    #[tokio::test]
    async fn search_pages_through_results() {
        let repo = EventsRepository::new(Arc::new(test_pool().await));
        for i in 0..5 {
            repo.create(&new_event(EventType::Noise, "A-1", i)).await.unwrap();
        }

        let (first, total) = repo.search(&EventFilter::default(), 0, 2).await.unwrap();
        let (last, _) = repo.search(&EventFilter::default(), 2, 2).await.unwrap();
        assert_eq!(total, 5);
        assert_eq!(first.len(), 2);
        assert_eq!(last.len(), 1);
    }

    #[tokio::test]
    async fn acknowledge_only_applies_once() {
        let pool = Arc::new(test_pool().await);
        let repo = EventsRepository::new(pool.clone());
        let event = repo.create(&new_event(EventType::Scream, "A-1", 5)).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let first = repo
            .acknowledge_in(&mut conn, event.id, crate::db::models::now())
            .await
            .unwrap();
        assert_eq!(first.unwrap().status, EventStatus::Acknowledged);

        let second = repo
            .acknowledge_in(&mut conn, event.id, crate::db::models::now())
            .await
            .unwrap();
        assert!(second.is_none());
    }
}
