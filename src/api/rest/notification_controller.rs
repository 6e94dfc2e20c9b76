use crate::api::extract::{Json, Path};
use crate::api::guard::AuthUser;
use crate::api::rest::{ApiResult, AppState};
use crate::db::models::notification_models::Notification;
use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCallRequest {
    pub location: Option<String>,
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyCallResponse {
    pub success: bool,
    pub message: String,
    pub report_number: String,
}

/// Routes under `/api/notifications`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/:id/read", post(mark_as_read))
        .route("/test-emergency", post(test_emergency))
        .route("/call-119", post(call_emergency_services))
}

/// The 20 most recent notifications
pub async fn list_notifications(State(state): State<AppState>) -> ApiResult<Json<Vec<Notification>>> {
    let notifications = state.notification_service.list_recent().await?;
    Ok(Json(notifications))
}

pub async fn mark_as_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<NotificationActionResponse>> {
    state.notification_service.mark_as_read(id).await?;
    Ok(Json(NotificationActionResponse {
        success: true,
        message: None,
    }))
}

pub async fn test_emergency(State(state): State<AppState>) -> ApiResult<Json<NotificationActionResponse>> {
    state
        .notification_service
        .create_system_alert(
            "Test emergency alert",
            "This is a test emergency alert. The system is working normally.",
        )
        .await?;

    Ok(Json(NotificationActionResponse {
        success: true,
        message: Some("Test alert sent".to_string()),
    }))
}

/// Record an emergency services report. No external call is placed; the
/// report is logged as a system alert.
pub async fn call_emergency_services(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    body: Option<Json<EmergencyCallRequest>>,
) -> ApiResult<Json<EmergencyCallResponse>> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let location = request.location.unwrap_or_else(|| "unknown location".to_string());
    let event_type = request.event_type.unwrap_or_else(|| "unknown".to_string());

    state
        .notification_service
        .create_system_alert(
            "Emergency services notified",
            &format!(
                "Location: {}, situation: {}. A report was filed with emergency services.",
                location, event_type
            ),
        )
        .await?;

    let report_number = format!("ALERT-{}", Utc::now().timestamp_millis());
    info!("Emergency report {} filed by {}", report_number, user.username);

    Ok(Json(EmergencyCallResponse {
        success: true,
        message: "Emergency report filed".to_string(),
        report_number,
    }))
}
