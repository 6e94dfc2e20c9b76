use crate::api::extract::Json;
use crate::api::guard::{AuthUser, RequestMeta};
use crate::api::rest::{ApiResult, AppState};
use crate::db::models::settings_models::{Settings, UpdateSettingsRequest};
use axum::extract::State;
use axum::routing::get;
use axum::Router;

/// Routes under `/api/settings`
pub fn create_router() -> Router<AppState> {
    Router::new().route("/me", get(get_settings).put(update_settings))
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<Settings>> {
    let settings = state.settings_service.get_or_create().await?;
    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    meta: RequestMeta,
    Json(request): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<Settings>> {
    let settings = state
        .settings_service
        .update(&request, &meta.activity_context(&user))
        .await?;
    Ok(Json(settings))
}
