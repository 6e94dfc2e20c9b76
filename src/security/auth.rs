use crate::config::SecurityConfig;
use crate::db::models::activity_log_models::{actions, ActivityContext, NewActivityLog};
use crate::db::models::now;
use crate::db::models::user_models::{AuthToken, LoginCredentials, User};
use crate::db::repositories::activity_logs::ActivityLogsRepository;
use crate::db::repositories::users::UsersRepository;
use crate::error::Error;
use crate::security::{password, SecurityService};
use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Authentication service for handling user login/logout
pub struct AuthService {
    users_repo: UsersRepository,
    activity_repo: ActivityLogsRepository,
    security: SecurityService,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(pool: Arc<SqlitePool>, config: &SecurityConfig) -> Self {
        Self {
            users_repo: UsersRepository::new(pool.clone()),
            activity_repo: ActivityLogsRepository::new(pool),
            security: SecurityService::new(config.clone()),
        }
    }

    /// Login a user with email/password. Accounts of every status may log
    /// in; the status gate decides what they can reach afterwards.
    pub async fn login(
        &self,
        credentials: &LoginCredentials,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<(User, AuthToken)> {
        let mut user = self
            .users_repo
            .get_by_email(credentials.email.trim())
            .await?
            .ok_or_else(|| Error::Authentication("Invalid email or password".to_string()))?;

        let valid = password::verify_password(&credentials.password, &user.password_hash)?;
        if !valid {
            warn!("Failed login attempt for {}", user.email);
            return Err(Error::Authentication("Invalid email or password".to_string()).into());
        }

        let logged_in_at = now();
        self.users_repo.update_last_login(user.id, &logged_in_at).await?;
        user.last_login = Some(logged_in_at);

        let token = self.security.generate_token(&user)?;

        let context = ActivityContext {
            user_id: user.id,
            username: user.username.clone(),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
        };
        self.activity_repo
            .create(&NewActivityLog::new(&context, actions::LOGIN, "User logged in"))
            .await?;

        info!("User logged in: {} ({})", user.username, user.status);

        Ok((user, token))
    }

    /// Record a logout. Tokens are stateless so nothing is revoked.
    pub async fn logout(&self, context: &ActivityContext) -> Result<()> {
        self.activity_repo
            .create(&NewActivityLog::new(context, actions::LOGOUT, "User logged out"))
            .await?;

        info!("User logged out: {}", context.username);

        Ok(())
    }

    /// Resolve a bearer token to the current stored user
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let token_data = self.security.validate_token(token)?;
        let user_id = self.security.get_user_id_from_token(&token_data)?;

        let user = self
            .users_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::Authentication("User no longer exists".to_string()))?;

        Ok(user)
    }

    /// Issue a token without a password check
    pub fn issue_token(&self, user: &User) -> Result<AuthToken> {
        self.security.generate_token(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::UserService;

    #[tokio::test]
    async fn login_reports_the_new_last_login() {
        let pool = Arc::new(test_pool().await);
        let config = SecurityConfig {
            password_hash_cost: 4,
            ..SecurityConfig::default()
        };
        UserService::new(pool.clone(), &config)
            .register("login@site.io", "secret", "Login")
            .await
            .unwrap();
        let auth = AuthService::new(pool, &config);
        let credentials = LoginCredentials {
            email: "login@site.io".to_string(),
            password: "secret".to_string(),
        };

        let (first, _) = auth.login(&credentials, "10.0.0.2", "agent").await.unwrap();
        let first_login = first.last_login.expect("last login set on first login");

        let (second, token) = auth.login(&credentials, "10.0.0.2", "agent").await.unwrap();
        let stored = auth.authenticate(&token.access_token).await.unwrap();
        assert_eq!(second.last_login, stored.last_login);
        assert!(second.last_login >= Some(first_login));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthenticated() {
        let pool = Arc::new(test_pool().await);
        let config = SecurityConfig {
            password_hash_cost: 4,
            ..SecurityConfig::default()
        };
        UserService::new(pool.clone(), &config)
            .register("pw@site.io", "secret", "Pw")
            .await
            .unwrap();
        let auth = AuthService::new(pool, &config);

        let err = auth
            .login(
                &LoginCredentials {
                    email: "pw@site.io".to_string(),
                    password: "guess".to_string(),
                },
                "10.0.0.2",
                "agent",
            )
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Authentication(_))));
    }
}
