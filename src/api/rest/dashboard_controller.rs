use crate::api::extract::{Json, Query};
use crate::api::rest::{ApiResult, AppState};
use crate::db;
use crate::db::models::event_models::EventResponse;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};

const RECENT_EVENT_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct DashboardParams {
    pub location: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_events: i64,
    pub new_events: i64,
    pub acknowledged_events: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub recent_events: Vec<EventResponse>,
    pub stats: DashboardStats,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub ai_status: &'static str,
    pub detection_enabled: bool,
    pub last_update: i64,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: bool,
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/status", get(get_status))
}

/// Recent events plus status counters, optionally for a single location
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardParams>,
) -> ApiResult<Json<DashboardResponse>> {
    let location = params.location.as_deref().filter(|l| !l.trim().is_empty());

    let (new_events, acknowledged_events) = state.event_service.status_counts(location).await?;
    let recent_events = state
        .event_service
        .recent(location, RECENT_EVENT_LIMIT)
        .await?
        .into_iter()
        .map(EventResponse::from)
        .collect();

    Ok(Json(DashboardResponse {
        recent_events,
        stats: DashboardStats {
            total_events: new_events + acknowledged_events,
            new_events,
            acknowledged_events,
        },
    }))
}

pub async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let ai_status = match state.ai_client.health().await {
        Ok(_) => "ACTIVE",
        Err(e) => {
            warn!("AI server health check failed: {}", e);
            "INACTIVE"
        }
    };
    let settings = state.settings_service.get_or_create().await?;

    Ok(Json(StatusResponse {
        ai_status,
        detection_enabled: settings.alert_enabled,
        last_update: Utc::now().timestamp_millis(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Liveness probe, reachable without a token
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "UP",
        database: db::health_check(&state.db_pool).await,
    })
}
