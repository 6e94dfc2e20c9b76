use crate::api::guard::AuthUser;
use crate::api::rest::{ApiResult, AppState};
use crate::error::Error;
use crate::services::audio::{AnalysisResult, AudioHealth, AudioUpload};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

/// Multipart framing allowance on top of the file itself
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Routes under `/api/audio`
pub fn create_router(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size + MULTIPART_OVERHEAD).unwrap_or(usize::MAX);

    Router::new()
        .route("/analyze", post(analyze_audio))
        .route("/upload", post(analyze_audio))
        .route("/health", get(audio_health))
        .layer(DefaultBodyLimit::max(body_limit))
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::FileValidation("File is too large".to_string())
    } else {
        Error::FileValidation(format!("Invalid upload: {}", e.body_text()))
    }
}

/// Classify an uploaded clip and record the result as an event
pub async fn analyze_audio(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<AnalysisResult>> {
    let mut upload = AudioUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                upload.filename = field.file_name().map(str::to_string);
                upload.data = field.bytes().await.map_err(multipart_error)?.to_vec();
            }
            Some("locationLabel") => {
                upload.location_label = Some(field.text().await.map_err(multipart_error)?);
            }
            _ => {}
        }
    }

    let result = state.audio_gateway.analyze(upload, &user.username).await?;
    Ok(Json(result))
}

pub async fn audio_health(State(state): State<AppState>) -> Json<AudioHealth> {
    Json(state.audio_gateway.health().await)
}
