use crate::api::extract::Json;
use crate::api::guard::{AuthUser, RequestMeta};
use crate::api::rest::{ApiResult, AppState};
use crate::db::models::user_models::{LoginCredentials, SignupRequest, UserResponse};
use axum::extract::State;
use axum::routing::{get, post};
use axum::Router;
use log::info;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub success: bool,
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub success: bool,
    pub user: UserResponse,
}

/// Routes under `/api/auth`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

/// `/api/me`, kept outside the auth prefix for older clients
pub fn create_me_router() -> Router<AppState> {
    Router::new().route("/api/me", get(me))
}

/// Register a new account awaiting approval
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<Json<SignupResponse>> {
    let user = state
        .user_service
        .register(&request.email, &request.password, &request.name)
        .await?;

    Ok(Json(SignupResponse {
        success: true,
        message: "Signup complete. You can use the service once an administrator approves your account."
            .to_string(),
        user: user.into(),
    }))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    meta: RequestMeta,
    Json(credentials): Json<LoginCredentials>,
) -> ApiResult<Json<LoginResponse>> {
    let (user, token) = state
        .auth_service
        .login(&credentials, &meta.ip_address, &meta.user_agent)
        .await?;

    info!("Login from {} for {}", meta.ip_address, user.username);

    Ok(Json(LoginResponse {
        success: true,
        message: "Login successful".to_string(),
        token: token.access_token,
        token_type: token.token_type,
        expires_in: token.expires_in,
        user: user.into(),
    }))
}

/// Tokens are stateless; this only records the logout when the caller is known
pub async fn logout(
    State(state): State<AppState>,
    principal: Option<AuthUser>,
    meta: RequestMeta,
) -> ApiResult<Json<MessageResponse>> {
    if let Some(AuthUser(user)) = principal {
        state
            .auth_service
            .logout(&meta.activity_context(&user))
            .await?;
    }

    Ok(Json(MessageResponse {
        success: true,
        message: "Logged out".to_string(),
    }))
}

pub async fn me(AuthUser(user): AuthUser) -> Json<CurrentUserResponse> {
    Json(CurrentUserResponse {
        success: true,
        user: user.into(),
    })
}
