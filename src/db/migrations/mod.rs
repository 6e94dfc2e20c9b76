use anyhow::{Context, Result};
use sqlx::{Executor, SqlitePool};
use tracing::info;

/// Ordered schema statements. Every statement is idempotent so the whole
/// list can be replayed on each start-up.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_login INTEGER
        )
        "#,
    ),
    (
        "002_create_events",
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            location_label TEXT NOT NULL,
            confidence REAL NOT NULL,
            status TEXT NOT NULL,
            audio_file_path TEXT,
            detected_at INTEGER NOT NULL,
            acknowledged_at INTEGER
        )
        "#,
    ),
    (
        "003_index_events_detected_at",
        "CREATE INDEX IF NOT EXISTS idx_events_detected_at ON events (detected_at DESC)",
    ),
    (
        "004_create_notifications",
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            notification_type TEXT NOT NULL,
            status TEXT NOT NULL,
            event_id INTEGER,
            user_id INTEGER,
            sent_at INTEGER NOT NULL,
            read_at INTEGER
        )
        "#,
    ),
    (
        "005_create_settings",
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            noise_threshold REAL NOT NULL,
            scream_threshold REAL NOT NULL,
            alert_enabled BOOLEAN NOT NULL,
            detect_mode TEXT NOT NULL,
            active_start TEXT NOT NULL,
            active_end TEXT NOT NULL,
            retention_days INTEGER NOT NULL
        )
        "#,
    ),
    (
        "006_create_user_activity_logs",
        r#"
        CREATE TABLE IF NOT EXISTS user_activity_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            username TEXT NOT NULL,
            action TEXT NOT NULL,
            details TEXT,
            ip_address TEXT NOT NULL,
            user_agent TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "007_index_activity_logs_user",
        "CREATE INDEX IF NOT EXISTS idx_activity_logs_user ON user_activity_logs (user_id, created_at DESC)",
    ),
];

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        pool.execute(*sql)
            .await
            .with_context(|| format!("Failed to apply migration {}", name))?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}
