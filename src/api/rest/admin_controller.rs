use crate::api::extract::{Json, Path, Query};
use crate::api::guard::{self, AuthUser, RequestMeta};
use crate::api::rest::{ApiResult, AppState};
use crate::db::models::activity_log_models::UserActivityLog;
use crate::db::models::event_models::Page;
use crate::db::models::user_models::{UpdateUserRequest, UserResponse};
use axum::extract::State;
use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UserActionResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

/// Routes under `/api/admin`, all restricted to administrators
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/pending", get(list_pending_users))
        .route("/users/:id/approve", post(approve_user))
        .route("/users/:id/reject", post(reject_user))
        .route("/users/:id", put(update_user).delete(delete_user))
        .route("/users/:id/activity-logs", get(user_activity_logs))
        .route("/activity-logs", get(activity_logs))
        .route_layer(middleware::from_fn(guard::require_admin))
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state.user_service.list_all().await?;
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

pub async fn list_pending_users(State(state): State<AppState>) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state.user_service.list_pending().await?;
    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

pub async fn approve_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    meta: RequestMeta,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserActionResponse>> {
    let user = state
        .user_service
        .approve(id, &meta.activity_context(&admin))
        .await?;

    Ok(Json(UserActionResponse {
        success: true,
        message: format!("User {} approved", user.username),
        user: user.into(),
    }))
}

pub async fn reject_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    meta: RequestMeta,
    Path(id): Path<i64>,
) -> ApiResult<Json<UserActionResponse>> {
    let user = state
        .user_service
        .reject(id, &meta.activity_context(&admin))
        .await?;

    Ok(Json(UserActionResponse {
        success: true,
        message: format!("User {} rejected", user.username),
        user: user.into(),
    }))
}

pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    meta: RequestMeta,
    Path(id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserActionResponse>> {
    let user = state
        .user_service
        .update(id, &request, &meta.activity_context(&admin))
        .await?;

    Ok(Json(UserActionResponse {
        success: true,
        message: format!("User {} updated", user.username),
        user: user.into(),
    }))
}

pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(admin): AuthUser,
    meta: RequestMeta,
    Path(id): Path<i64>,
) -> ApiResult<Json<DeleteResponse>> {
    state
        .user_service
        .delete(id, &meta.activity_context(&admin))
        .await?;

    info!("Admin {} deleted user {}", admin.username, id);

    Ok(Json(DeleteResponse {
        success: true,
        message: format!("User {} deleted", id),
    }))
}

pub async fn activity_logs(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<UserActivityLog>>> {
    let page = state
        .activity_log_service
        .list(params.page, params.size)
        .await?;
    Ok(Json(page))
}

pub async fn user_activity_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<UserActivityLog>>> {
    let page = state
        .activity_log_service
        .list_for_user(id, params.page, params.size)
        .await?;
    Ok(Json(page))
}
