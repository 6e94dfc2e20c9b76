use crate::config::SecurityConfig;
use crate::db::models::activity_log_models::{actions, ActivityContext, NewActivityLog};
use crate::db::models::now;
use crate::db::models::user_models::{UpdateUserRequest, User, UserRole, UserStatus};
use crate::db::repositories::activity_logs::ActivityLogsRepository;
use crate::db::repositories::users::UsersRepository;
use crate::error::Error;
use crate::security::password;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid"));

/// Registration, approval and account administration
pub struct UserService {
    pool: Arc<SqlitePool>,
    users_repo: UsersRepository,
    activity_repo: ActivityLogsRepository,
    config: SecurityConfig,
}

impl UserService {
    pub fn new(pool: Arc<SqlitePool>, config: &SecurityConfig) -> Self {
        Self {
            users_repo: UsersRepository::new(pool.clone()),
            activity_repo: ActivityLogsRepository::new(pool.clone()),
            pool,
            config: config.clone(),
        }
    }

    /// Register a new manager account awaiting approval
    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User> {
        let email = email.trim();
        validate_email(email)?;
        if password.is_empty() {
            return Err(Error::field("password", "password is required").into());
        }

        if self.users_repo.email_exists(email).await? {
            return Err(Error::AlreadyExists(format!("Email already registered: {}", email)).into());
        }

        let password_hash = password::hash_password(password, &self.config)?;
        let timestamp = now();
        let user = User {
            id: 0,
            username: email.to_string(),
            email: email.to_string(),
            password_hash,
            name: name.trim().to_string(),
            role: UserRole::Manager,
            status: UserStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
            last_login: None,
        };

        let created = self.users_repo.create(&user).await?;

        info!("New user registered: {} (pending approval)", created.username);

        Ok(created)
    }

    /// Create an account with an explicit role and status, skipping approval
    pub async fn create_account(
        &self,
        email: &str,
        password: &str,
        name: &str,
        role: UserRole,
        status: UserStatus,
    ) -> Result<User> {
        let mut user = self.register(email, password, name).await?;
        if user.role == role && user.status == status {
            return Ok(user);
        }

        user.role = role;
        user.status = status;
        user.updated_at = now();

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| Error::Database(format!("Failed to acquire connection: {}", e)))?;
        self.users_repo.update_in(&mut conn, &user).await
    }

    pub async fn get(&self, user_id: i64) -> Result<User> {
        let user = self
            .users_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", user_id)))?;

        Ok(user)
    }

    pub async fn list_all(&self) -> Result<Vec<User>> {
        self.users_repo.get_all().await
    }

    pub async fn list_pending(&self) -> Result<Vec<User>> {
        self.users_repo.get_by_status(UserStatus::Pending).await
    }

    /// PENDING -> ACTIVE
    pub async fn approve(&self, user_id: i64, actor: &ActivityContext) -> Result<User> {
        self.transition(user_id, UserStatus::Active, "User approved", actor).await
    }

    /// PENDING -> REJECTED
    pub async fn reject(&self, user_id: i64, actor: &ActivityContext) -> Result<User> {
        self.transition(user_id, UserStatus::Rejected, "User rejected", actor).await
    }

    async fn transition(
        &self,
        user_id: i64,
        target: UserStatus,
        label: &str,
        actor: &ActivityContext,
    ) -> Result<User> {
        let mut user = self.get(user_id).await?;
        let current = user.status;
        user.status = current.transition_to(target)?;
        user.updated_at = now();

        let updated = self.save_with_audit(&user, Some(current), label, actor).await?;

        info!("{}: {} by {}", label, updated.username, actor.username);

        Ok(updated)
    }

    /// Apply the fields present in the request
    pub async fn update(
        &self,
        user_id: i64,
        request: &UpdateUserRequest,
        actor: &ActivityContext,
    ) -> Result<User> {
        let mut user = self.get(user_id).await?;

        // Parse everything before touching the record so a bad field leaves
        // no partial change behind.
        let role = request.role.as_deref().map(str::parse::<UserRole>).transpose()?;
        let status = request.status.as_deref().map(str::parse::<UserStatus>).transpose()?;

        if let Some(name) = &request.name {
            user.name = name.trim().to_string();
        }

        if let Some(email) = &request.email {
            let email = email.trim();
            if email != user.email {
                validate_email(email)?;
                if self.users_repo.email_exists(email).await? {
                    return Err(
                        Error::AlreadyExists(format!("Email already registered: {}", email)).into(),
                    );
                }
                user.email = email.to_string();
                user.username = email.to_string();
            }
        }

        if let Some(role) = role {
            user.role = role;
        }

        let mut expected = None;
        if let Some(status) = status {
            if status != user.status {
                expected = Some(user.status);
                user.status = user.status.transition_to(status)?;
            }
        }

        user.updated_at = now();

        let updated = self.save_with_audit(&user, expected, "User updated", actor).await?;

        info!("User updated: {} by {}", updated.username, actor.username);

        Ok(updated)
    }

    /// Permanently remove an account
    pub async fn delete(&self, user_id: i64, actor: &ActivityContext) -> Result<()> {
        let user = self.get(user_id).await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        if !self.users_repo.delete_in(&mut *tx, user.id).await? {
            return Err(Error::NotFound(format!("User not found: {}", user_id)).into());
        }
        self.activity_repo
            .create_in(
                &mut *tx,
                &NewActivityLog::new(
                    actor,
                    actions::USER_MANAGEMENT,
                    format!("User deleted: {}", user.username),
                ),
            )
            .await?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        info!("User deleted: {} by {}", user.username, actor.username);

        Ok(())
    }

    /// Persist a user change together with its audit entry. With `expected`
    /// set, the write only lands while the stored status still matches it.
    async fn save_with_audit(
        &self,
        user: &User,
        expected: Option<UserStatus>,
        label: &str,
        actor: &ActivityContext,
    ) -> Result<User> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::Database(format!("Failed to begin transaction: {}", e)))?;

        let updated = match expected {
            None => self.users_repo.update_in(&mut *tx, user).await?,
            Some(expected) => self
                .users_repo
                .update_if_status_in(&mut *tx, user, expected)
                .await?
                .ok_or_else(|| {
                    Error::InvalidStateTransition(format!(
                        "User is not in {} status (requested: {})",
                        expected.as_str().to_lowercase(),
                        user.status
                    ))
                })?,
        };
        self.activity_repo
            .create_in(
                &mut *tx,
                &NewActivityLog::new(
                    actor,
                    actions::USER_MANAGEMENT,
                    format!("{}: {}", label, updated.username),
                ),
            )
            .await?;

        tx.commit()
            .await
            .map_err(|e| Error::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(updated)
    }
}

fn validate_email(email: &str) -> Result<(), Error> {
    if email.is_empty() {
        return Err(Error::field("email", "email is required"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(Error::field("email", format!("Invalid email address: {}", email)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn service() -> (UserService, Arc<SqlitePool>) {
        let pool = Arc::new(test_pool().await);
        let config = SecurityConfig {
            password_hash_cost: 4,
            ..SecurityConfig::default()
        };
        (UserService::new(pool.clone(), &config), pool)
    }

    fn admin() -> ActivityContext {
        ActivityContext {
            user_id: 1,
            username: "admin@alertory.com".into(),
            ip_address: "10.0.0.1".into(),
            user_agent: "test-agent".into(),
        }
    }

    async fn audit_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM user_activity_logs WHERE action = 'USER_MANAGEMENT'")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    fn error_of(err: &anyhow::Error) -> &Error {
        err.downcast_ref::<Error>().expect("domain error")
    }

    #[tokio::test]
    async fn register_creates_pending_manager() {
        let (service, _) = service().await;
        let user = service.register("new@site.io", "pw", "New").await.unwrap();

        assert_eq!(user.status, UserStatus::Pending);
        assert_eq!(user.role, UserRole::Manager);
        assert_eq!(user.username, user.email);
        assert_ne!(user.password_hash, "pw");
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let (service, _) = service().await;
        service.register("dup@site.io", "pw", "A").await.unwrap();
        let err = service.register("dup@site.io", "pw", "B").await.unwrap_err();
        assert!(matches!(error_of(&err), Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn register_validates_email_shape() {
        let (service, _) = service().await;
        let err = service.register("not-an-email", "pw", "A").await.unwrap_err();
        assert!(matches!(
            error_of(&err),
            Error::Validation { field: Some(f), .. } if f == "email"
        ));
    }

    #[tokio::test]
    async fn approve_then_reject_fails() {
        let (service, pool) = service().await;
        let user = service.register("p@site.io", "pw", "P").await.unwrap();

        let approved = service.approve(user.id, &admin()).await.unwrap();
        assert_eq!(approved.status, UserStatus::Active);

        let err = service.reject(user.id, &admin()).await.unwrap_err();
        assert!(matches!(error_of(&err), Error::InvalidStateTransition(_)));
        let err = service.approve(user.id, &admin()).await.unwrap_err();
        assert!(matches!(error_of(&err), Error::InvalidStateTransition(_)));

        assert_eq!(service.get(user.id).await.unwrap().status, UserStatus::Active);
        assert_eq!(audit_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn rejected_is_terminal() {
        let (service, _) = service().await;
        let user = service.register("r@site.io", "pw", "R").await.unwrap();
        service.reject(user.id, &admin()).await.unwrap();

        let err = service.approve(user.id, &admin()).await.unwrap_err();
        assert!(matches!(error_of(&err), Error::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn approve_missing_user_is_not_found() {
        let (service, pool) = service().await;
        let err = service.approve(999, &admin()).await.unwrap_err();
        assert!(matches!(error_of(&err), Error::NotFound(_)));
        assert_eq!(audit_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn update_applies_only_present_fields() {
        let (service, pool) = service().await;
        let user = service.register("u@site.io", "pw", "Before").await.unwrap();

        let updated = service
            .update(
                user.id,
                &UpdateUserRequest {
                    name: Some("After".into()),
                    role: Some("ADMIN".into()),
                    ..UpdateUserRequest::default()
                },
                &admin(),
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "After");
        assert_eq!(updated.role, UserRole::Admin);
        assert_eq!(updated.email, "u@site.io");
        assert_eq!(updated.status, UserStatus::Pending);
        assert_eq!(audit_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn update_rejects_unknown_enum_values() {
        let (service, pool) = service().await;
        let user = service.register("e@site.io", "pw", "E").await.unwrap();

        let err = service
            .update(
                user.id,
                &UpdateUserRequest {
                    name: Some("Changed".into()),
                    role: Some("SUPERUSER".into()),
                    ..UpdateUserRequest::default()
                },
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error_of(&err),
            Error::Validation { field: Some(f), .. } if f == "role"
        ));
        assert_eq!(service.get(user.id).await.unwrap().name, "E");
        assert_eq!(audit_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn update_status_follows_workflow() {
        let (service, _) = service().await;
        let user = service.register("s@site.io", "pw", "S").await.unwrap();

        let active = service
            .update(
                user.id,
                &UpdateUserRequest {
                    status: Some("ACTIVE".into()),
                    ..UpdateUserRequest::default()
                },
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(active.status, UserStatus::Active);

        let err = service
            .update(
                user.id,
                &UpdateUserRequest {
                    status: Some("PENDING".into()),
                    ..UpdateUserRequest::default()
                },
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error_of(&err), Error::InvalidStateTransition(_)));
    }

    #[tokio::test]
    async fn update_email_keeps_username_mirrored() {
        let (service, _) = service().await;
        service.register("taken@site.io", "pw", "T").await.unwrap();
        let user = service.register("old@site.io", "pw", "O").await.unwrap();

        let err = service
            .update(
                user.id,
                &UpdateUserRequest {
                    email: Some("taken@site.io".into()),
                    ..UpdateUserRequest::default()
                },
                &admin(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error_of(&err), Error::AlreadyExists(_)));

        let updated = service
            .update(
                user.id,
                &UpdateUserRequest {
                    email: Some("fresh@site.io".into()),
                    ..UpdateUserRequest::default()
                },
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "fresh@site.io");
        assert_eq!(updated.username, "fresh@site.io");
    }

    #[tokio::test]
    async fn delete_removes_user_and_audits() {
        let (service, pool) = service().await;
        let user = service.register("d@site.io", "pw", "D").await.unwrap();

        service.delete(user.id, &admin()).await.unwrap();
        let err = service.get(user.id).await.unwrap_err();
        assert!(matches!(error_of(&err), Error::NotFound(_)));
        assert_eq!(audit_count(&pool).await, 1);

        let err = service.delete(user.id, &admin()).await.unwrap_err();
        assert!(matches!(error_of(&err), Error::NotFound(_)));
    }

    #[tokio::test]
    async fn racing_approve_and_reject_settle_once() {
        let (service, pool) = service().await;
        let user = service.register("race@site.io", "pw", "Race").await.unwrap();

        let actor = admin();
        let (approved, rejected) = tokio::join!(
            service.approve(user.id, &actor),
            service.reject(user.id, &actor)
        );

        assert!(approved.is_ok() != rejected.is_ok());
        let loser = approved.err().or(rejected.err()).unwrap();
        assert!(matches!(error_of(&loser), Error::InvalidStateTransition(_)));
        assert_eq!(audit_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn stale_snapshot_cannot_overwrite_terminal_status() {
        let (service, pool) = service().await;
        let user = service.register("stale@site.io", "pw", "Stale").await.unwrap();
        service.approve(user.id, &admin()).await.unwrap();

        // `user` still carries the PENDING status read before approval
        let mut stale = user.clone();
        stale.status = UserStatus::Rejected;
        let err = service
            .save_with_audit(&stale, Some(UserStatus::Pending), "User rejected", &admin())
            .await
            .unwrap_err();

        assert!(matches!(error_of(&err), Error::InvalidStateTransition(_)));
        assert_eq!(service.get(user.id).await.unwrap().status, UserStatus::Active);
        assert_eq!(audit_count(&pool).await, 1);
    }
}
