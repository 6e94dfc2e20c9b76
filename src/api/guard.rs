use crate::api::rest::{ApiError, AppState};
use crate::db::models::activity_log_models::ActivityContext;
use crate::db::models::user_models::{User, UserRole, UserStatus};
use async_trait::async_trait;
use axum::extract::{ConnectInfo, FromRequestParts, OriginalUri, Request, State};
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::debug;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;

/// Reachable without a token
const PUBLIC_PATHS: [&str; 3] = ["/api/auth/signup", "/api/auth/login", "/api/auth/logout"];

/// Authenticated principal, placed in request extensions by [`guard_chain`]
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required"))
    }
}

/// Caller address and agent, recorded in the audit trail
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub ip_address: String,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn activity_context(&self, user: &User) -> ActivityContext {
        ActivityContext {
            user_id: user.id,
            username: user.username.clone(),
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header_value = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let ip_address = header_value("x-forwarded-for")
            .and_then(|value| value.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header_value("x-real-ip"))
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = header_value(header::USER_AGENT.as_str()).unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            ip_address,
            user_agent,
        })
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn is_status_exempt(path: &str) -> bool {
    path == "/api/me" || path.starts_with("/api/auth/")
}

fn not_active(status: UserStatus) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "success": false,
            "error": "Account not active",
            "message": format!("Account is {}; an administrator must approve it first", status),
            "status": status.as_str(),
        })),
    )
        .into_response()
}

/// Allow-list, then token check, then account status check.
/// Paths outside `/api/` are not gated.
pub async fn guard_chain(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|OriginalUri(uri)| uri.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    if !path.starts_with("/api/") {
        return next.run(request).await;
    }

    let token = bearer_token(&request).map(str::to_string);

    if PUBLIC_PATHS.contains(&path.as_str()) {
        // A valid token is still resolved so logout can be attributed.
        if let Some(token) = token {
            if let Ok(user) = state.auth_service.authenticate(&token).await {
                request.extensions_mut().insert(AuthUser(user));
            }
        }
        return next.run(request).await;
    }

    let token = match token {
        Some(token) => token,
        None => return ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required").into_response(),
    };

    let user = match state.auth_service.authenticate(&token).await {
        Ok(user) => user,
        Err(e) => {
            debug!("Rejected token for {}: {}", path, e);
            return ApiError::from(e).into_response();
        }
    };

    if user.status != UserStatus::Active && !is_status_exempt(&path) {
        debug!("Blocked {} account {} from {}", user.status, user.username, path);
        return not_active(user.status);
    }

    request.extensions_mut().insert(AuthUser(user));
    next.run(request).await
}

/// Admin-only routes
pub async fn require_admin(request: Request, next: Next) -> Response {
    let role = request
        .extensions()
        .get::<AuthUser>()
        .map(|AuthUser(user)| user.role);

    match role {
        Some(UserRole::Admin) => next.run(request).await,
        Some(_) => ApiError::new(StatusCode::FORBIDDEN, "Administrator role required").into_response(),
        None => ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required").into_response(),
    }
}
