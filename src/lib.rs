pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod security;
pub mod services;

// Re-export main components for easier use
pub use api::rest::{build_router, AppState, RestApi};
pub use config::Config;
pub use error::Error;
