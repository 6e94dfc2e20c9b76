use crate::api::extract::{Json, Query};
use crate::api::rest::{ApiResult, AppState};
use crate::error::Error;
use crate::services::analytics::AnalyticsReport;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportParams {
    pub format: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

/// Routes under `/api/analytics`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_analytics))
        .route("/export", get(export_analytics))
}

pub async fn get_analytics(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> ApiResult<Json<AnalyticsReport>> {
    let report = state
        .analytics_service
        .report(params.start_date.as_deref(), params.end_date.as_deref())
        .await?;
    Ok(Json(report))
}

/// Download the report as JSON or the underlying events as CSV
pub async fn export_analytics(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> ApiResult<Response> {
    let format = params
        .format
        .ok_or_else(|| Error::field("format", "format is required (json or csv)"))?;

    let export = state
        .analytics_service
        .export(&format, params.start_date.as_deref(), params.end_date.as_deref())
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, export.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", export.filename),
            ),
        ],
        export.body,
    )
        .into_response())
}
