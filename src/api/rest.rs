use crate::api::guard;
use crate::config::Config;
use crate::error::Error;
use crate::security::auth::AuthService;
use crate::services::{
    analytics::AnalyticsService, ActivityLogService, AiClient, AudioAnalysisGateway, AudioStorage,
    EventService, NotificationService, SettingsService, UserService,
};
use anyhow::Result;
use axum::extract::path::ErrorKind;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{
    http::{HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod admin_controller;
pub mod analytics_controller;
pub mod audio_controller;
pub mod auth_controller;
pub mod dashboard_controller;
pub mod event_controller;
pub mod notification_controller;
pub mod settings_controller;


// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: Arc<SqlitePool>,
    pub config: Arc<Config>,
    pub auth_service: Arc<AuthService>,
    pub user_service: Arc<UserService>,
    pub event_service: EventService,
    pub audio_gateway: Arc<AudioAnalysisGateway>,
    pub analytics_service: AnalyticsService,
    pub notification_service: NotificationService,
    pub settings_service: SettingsService,
    pub activity_log_service: ActivityLogService,
    pub ai_client: AiClient,
}

impl AppState {
    pub fn new(db_pool: Arc<SqlitePool>, config: Config) -> Result<Self> {
        let ai_client = AiClient::new(&config.ai_server)?;
        let storage = AudioStorage::new(&config.storage);

        Ok(Self {
            auth_service: Arc::new(AuthService::new(db_pool.clone(), &config.security)),
            user_service: Arc::new(UserService::new(db_pool.clone(), &config.security)),
            event_service: EventService::new(db_pool.clone(), storage),
            audio_gateway: Arc::new(AudioAnalysisGateway::new(
                db_pool.clone(),
                ai_client.clone(),
                &config.storage,
            )),
            analytics_service: AnalyticsService::new(db_pool.clone()),
            notification_service: NotificationService::new(db_pool.clone()),
            settings_service: SettingsService::new(db_pool.clone()),
            activity_log_service: ActivityLogService::new(db_pool.clone()),
            ai_client,
            config: Arc::new(config),
            db_pool,
        })
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub success: bool,
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            status: status.as_u16(),
            field: None,
            timestamp: Utc::now(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation { field, message } => ApiError {
                field,
                ..ApiError::new(StatusCode::BAD_REQUEST, message)
            },
            Error::FileValidation(message)
            | Error::AlreadyExists(message)
            | Error::InvalidStateTransition(message) => {
                ApiError::new(StatusCode::BAD_REQUEST, message)
            }
            Error::NotFound(message) => ApiError::new(StatusCode::NOT_FOUND, message),
            Error::Authentication(message) => ApiError::new(StatusCode::UNAUTHORIZED, message),
            Error::Authorization(message) => ApiError::new(StatusCode::FORBIDDEN, message),
            Error::AiServerUnavailable(message) => {
                ApiError::new(StatusCode::SERVICE_UNAVAILABLE, message)
            }
            Error::AiServerError(message) | Error::AiServerInvalidResponse(message) => {
                ApiError::new(StatusCode::BAD_GATEWAY, message)
            }
            Error::Config(_) | Error::Database(_) | Error::Io(_) | Error::Internal(_) => {
                error!("Request failed: {}", err);
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(err) = err.downcast_ref::<Error>() {
            return (*err).clone().into();
        }

        error!("Request failed: {:#}", err);
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

/// Field named in a deserialization failure such as
/// `"...target type: confidence: invalid type..."`
fn rejected_field(detail: &str) -> Option<String> {
    let (_, rest) = detail
        .split_once("target type: ")
        .or_else(|| detail.split_once("query string: "))?;
    let (path, _) = rest.split_once(": ")?;
    if path.is_empty() || path == "." || path.contains(char::is_whitespace) {
        return None;
    }
    Some(path.to_string())
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = rejection.body_text();
        let field = match rejection {
            JsonRejection::JsonDataError(_) => rejected_field(&message),
            _ => None,
        };
        Error::Validation { field, message }.into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        let message = rejection.body_text();
        Error::Validation {
            field: rejected_field(&message),
            message,
        }
        .into()
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        let field = match &rejection {
            PathRejection::FailedToDeserializePathParams(e) => match e.kind() {
                ErrorKind::ParseErrorAtKey { key, .. } => Some(key.clone()),
                _ => None,
            },
            _ => None,
        };
        Error::Validation {
            field,
            message: rejection.body_text(),
        }
        .into()
    }
}

/// Implement IntoResponse for ApiError
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(self);
        (status, body).into_response()
    }
}

/// Assemble every route behind the guard chain
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/api/auth", auth_controller::create_router())
        .nest("/api/admin", admin_controller::create_router())
        .nest("/api/audio", audio_controller::create_router(state.config.storage.max_file_size_bytes))
        .nest("/api/events", event_controller::create_router())
        .nest("/api/settings", settings_controller::create_router())
        .nest("/api/analytics", analytics_controller::create_router())
        .nest("/api/notifications", notification_controller::create_router())
        .merge(auth_controller::create_me_router())
        .merge(dashboard_controller::create_router())
        .route("/health", get(dashboard_controller::health));

    let static_dir = state.config.api.static_dir.clone();

    api.layer(middleware::from_fn_with_state(state.clone(), guard::guard_chain))
        .with_state(state)
        .fallback_service(ServeDir::new(static_dir))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(3600));

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|origin| origin.as_str() != "*")
        .filter_map(|origin| origin.parse().ok())
        .collect();

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

pub struct RestApi {
    state: AppState,
}

impl RestApi {
    pub fn new(db_pool: Arc<SqlitePool>, config: Config) -> Result<Self> {
        Ok(Self {
            state: AppState::new(db_pool, config)?,
        })
    }

    pub async fn run(&self) -> Result<()> {
        let config = &self.state.config.api;

        let app = build_router(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.cors_allowed_origins));

        let addr = config.address.clone() + ":" + &config.port.to_string();
        let addr: SocketAddr = addr.parse()?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;

        Ok(())
    }
}
