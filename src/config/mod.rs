use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub ai_server: AiServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

/// API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// API server address
    #[serde(default = "default_address")]
    pub address: String,
    /// API server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Origins allowed by CORS; empty means any origin
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
    /// Directory with the built dashboard frontend
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            log_level: default_log_level(),
            cors_allowed_origins: vec!["http://localhost:5173".to_string()],
            static_dir: default_static_dir(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL
    #[serde(default = "default_db_url")]
    pub url: String,
    /// Connection pool max size
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Automatic migration on startup
    #[serde(default = "default_true")]
    pub auto_migrate: bool,
}

fn default_db_url() -> String {
    "sqlite://alertory.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
            auto_migrate: true,
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// JWT secret key
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// JWT token expiration time in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: u64,
    /// Password hashing cost (higher is more secure but slower)
    #[serde(default = "default_password_hash_cost")]
    pub password_hash_cost: u32,
}

fn default_jwt_secret() -> String {
    "default_secret_change_in_production".to_string()
}

fn default_jwt_expiration() -> u64 {
    60 * 12
}

fn default_password_hash_cost() -> u32 {
    10 // reasonable default for bcrypt
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            jwt_expiration_minutes: default_jwt_expiration(),
            password_hash_cost: default_password_hash_cost(),
        }
    }
}

/// Scale the AI server reports confidence in
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceScale {
    /// 0.0 to 1.0, stored as-is
    Unit,
    /// 0 to 100, divided by 100 before storage
    Percent,
}

/// External AI inference server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AiServerConfig {
    /// Base URL; `/predict` and `/health` are resolved against it
    #[serde(default = "default_ai_url")]
    pub url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_confidence_scale")]
    pub confidence_scale: ConfidenceScale,
}

fn default_ai_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_response_timeout() -> u64 {
    30
}

fn default_confidence_scale() -> ConfidenceScale {
    ConfidenceScale::Unit
}

impl Default for AiServerConfig {
    fn default() -> Self {
        Self {
            url: default_ai_url(),
            connect_timeout_secs: default_connect_timeout(),
            response_timeout_secs: default_response_timeout(),
            confidence_scale: default_confidence_scale(),
        }
    }
}

/// Uploaded audio storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory for stored uploads
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size_bytes: u64,
    /// Location label used when an upload doesn't carry one
    #[serde(default = "default_location_label")]
    pub default_location_label: String,
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("uploads/audio")
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024
}

fn default_location_label() -> String {
    "Unassigned".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            max_file_size_bytes: default_max_file_size(),
            default_location_label: default_location_label(),
        }
    }
}

/// Initial data seeding
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeedConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

fn default_admin_email() -> String {
    "admin@alertory.com".to_string()
}

fn default_admin_password() -> String {
    "change-me".to_string()
}

fn default_admin_name() -> String {
    "System Admin".to_string()
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            admin_email: default_admin_email(),
            admin_password: default_admin_password(),
            admin_name: default_admin_name(),
        }
    }
}

/// Load configuration from a file or use default
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    match config_path {
        Some(path) => {
            let config_str = std::fs::read_to_string(path)
                .context(format!("Failed to read config file: {:?}", path))?;

            let config = if path.extension().map_or(false, |ext| ext == "json") {
                serde_json::from_str(&config_str).context("Failed to parse JSON config")?
            } else if path.extension().map_or(false, |ext| ext == "toml") {
                toml::from_str(&config_str).context("Failed to parse TOML config")?
            } else {
                return Err(anyhow::anyhow!("Unsupported config file format"));
            };

            Ok(config)
        }
        None => Ok(Config::default()),
    }
}
