use crate::api::extract::{Json, Path, Query};
use crate::api::guard::{AuthUser, RequestMeta};
use crate::api::rest::{ApiResult, AppState};
use crate::db::models::event_models::{CreateEventRequest, EventQuery, EventResponse, Page};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;

/// Routes under `/api/events`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_events).post(create_event))
        .route("/:id", get(get_event))
        .route("/:id/acknowledge", post(acknowledge_event))
        .route("/:id/audio", get(download_audio))
}

/// Filtered, paged event list
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventQuery>,
) -> ApiResult<Json<Page<EventResponse>>> {
    let page = state.event_service.list(&query).await?;
    Ok(Json(page.map(EventResponse::from)))
}

/// Manually report an event
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> ApiResult<(StatusCode, Json<EventResponse>)> {
    let event = state.event_service.create(&request).await?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<EventResponse>> {
    let event = state.event_service.get(id).await?;
    Ok(Json(event.into()))
}

pub async fn acknowledge_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    meta: RequestMeta,
    Path(id): Path<i64>,
) -> ApiResult<Json<EventResponse>> {
    let event = state
        .event_service
        .acknowledge(id, &meta.activity_context(&user))
        .await?;
    Ok(Json(event.into()))
}

/// Serve the stored clip as an attachment
pub async fn download_audio(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let audio = state.event_service.download_audio(id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", audio.filename),
            ),
        ],
        audio.data,
    )
        .into_response())
}
