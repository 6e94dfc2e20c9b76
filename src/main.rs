use alertory::config;
use alertory::db::{self, DatabaseService};
use alertory::RestApi;
use anyhow::Result;
use log::{error, info};
use std::path::PathBuf;

const CONFIG_ENV: &str = "ALERTORY_CONFIG";

/// First CLI argument wins over the environment
fn config_path() -> Option<PathBuf> {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
}

async fn run_app() -> Result<()> {
    let config = config::load_config(config_path().as_deref())?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.api.log_level.as_str()),
    )
    .init();
    info!("Starting Alertory {}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.storage.audio_dir)?;
    info!("Audio files stored in {:?}", config.storage.audio_dir);

    let database = DatabaseService::new(&config.database).await?;
    db::seed::seed(database.pool.clone(), &config.seed, &config.security).await?;
    info!("Database ready");

    let http_server = RestApi::new(database.pool.clone(), config)?;

    tokio::select! {
        result = http_server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
    }

    database.pool.close().await;

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        error!("Application error: {:#}", e);
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}
