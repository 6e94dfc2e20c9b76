use crate::config::{SecurityConfig, SeedConfig};
use crate::db::models::user_models::{UserRole, UserStatus};
use crate::db::repositories::users::UsersRepository;
use crate::services::{SettingsService, UserService};
use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

/// Create the bootstrap admin account and the settings row when missing
pub async fn seed(pool: Arc<SqlitePool>, seed: &SeedConfig, security: &SecurityConfig) -> Result<()> {
    if !seed.enabled {
        info!("Seeding disabled");
        return Ok(());
    }

    let users_repo = UsersRepository::new(pool.clone());
    if !users_repo.email_exists(&seed.admin_email).await? {
        let users = UserService::new(pool.clone(), security);
        let admin = users
            .create_account(
                &seed.admin_email,
                &seed.admin_password,
                &seed.admin_name,
                UserRole::Admin,
                UserStatus::Active,
            )
            .await?;
        info!("Seeded admin account {}", admin.email);
    }

    SettingsService::new(pool).get_or_create().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn seeding_is_repeatable() {
        let pool = Arc::new(test_pool().await);
        let security = SecurityConfig {
            password_hash_cost: 4,
            ..SecurityConfig::default()
        };
        let config = SeedConfig::default();

        seed(pool.clone(), &config, &security).await.unwrap();
        seed(pool.clone(), &config, &security).await.unwrap();

        let admin = UsersRepository::new(pool.clone())
            .get_by_email(&config.admin_email)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert_eq!(admin.status, UserStatus::Active);

        let users: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&*pool)
            .await
            .unwrap();
        let settings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
            .fetch_one(&*pool)
            .await
            .unwrap();
        assert_eq!((users, settings), (1, 1));
    }
}
