use crate::{
    db::models::{
        to_millis,
        user_models::{User, UserStatus},
    },
    error::Error,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::info;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, name, role, status, created_at, updated_at, last_login";

/// Users repository for handling user operations
#[derive(Clone)]
pub struct UsersRepository {
    pool: Arc<SqlitePool>,
}

impl UsersRepository {
    /// Create a new users repository
    pub fn new(pool: Arc<SqlitePool>) -> Self {
        Self { pool }
    }

    /// Create a new user. The id on `user` is ignored.
    pub async fn create(&self, user: &User) -> Result<User> {
        info!("Creating new user: {}", user.username);

        let result = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, name, role, status, created_at, updated_at, last_login)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(user.status.as_str())
        .bind(to_millis(&user.created_at))
        .bind(to_millis(&user.updated_at))
        .bind(user.last_login.as_ref().map(to_millis))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| unique_email_error(e, &user.email, "Failed to create user"))?;

        Ok(result)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = ?",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get user by ID: {}", e)))?;

        Ok(result)
    }

    /// Get user by email
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = ?",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get user by email: {}", e)))?;

        Ok(result)
    }

    /// Check whether an email is already registered
    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to check email: {}", e)))?;

        Ok(count > 0)
    }

    /// Update user inside an open transaction
    pub async fn update_in(&self, conn: &mut SqliteConnection, user: &User) -> Result<User> {
        let result = self
            .update_where(conn, user, None)
            .await?
            .ok_or_else(|| Error::NotFound(format!("User not found: {}", user.id)))?;

        Ok(result)
    }

    /// Update user only while its stored status is still `expected`.
    /// Returns None when the row is gone or its status has moved on.
    pub async fn update_if_status_in(
        &self,
        conn: &mut SqliteConnection,
        user: &User,
        expected: UserStatus,
    ) -> Result<Option<User>> {
        self.update_where(conn, user, Some(expected)).await
    }

    async fn update_where(
        &self,
        conn: &mut SqliteConnection,
        user: &User,
        expected: Option<UserStatus>,
    ) -> Result<Option<User>> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = ?, email = ?, password_hash = ?, name = ?, role = ?, status = ?, updated_at = ?
            WHERE id = ?{}
            RETURNING {}
            "#,
            if expected.is_some() { " AND status = ?" } else { "" },
            USER_COLUMNS
        );

        let mut query = sqlx::query_as::<_, User>(&sql)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.role.as_str())
            .bind(user.status.as_str())
            .bind(to_millis(&user.updated_at))
            .bind(user.id);
        if let Some(expected) = expected {
            query = query.bind(expected.as_str());
        }

        let result = query
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| unique_email_error(e, &user.email, "Failed to update user"))?;

        Ok(result)
    }

    /// Delete user inside an open transaction
    pub async fn delete_in(&self, conn: &mut SqliteConnection, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *conn)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete user: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Get all users
    pub async fn get_all(&self) -> Result<Vec<User>> {
        let result = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY id",
            USER_COLUMNS
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get all users: {}", e)))?;

        Ok(result)
    }

    /// Get users by status
    pub async fn get_by_status(&self, status: UserStatus) -> Result<Vec<User>> {
        let result = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE status = ? ORDER BY id",
            USER_COLUMNS
        ))
        .bind(status.as_str())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get users by status: {}", e)))?;

        Ok(result)
    }

    /// Update last login time
    pub async fn update_last_login(&self, id: i64, at: &DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(to_millis(at))
            .bind(id)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to update last login: {}", e)))?;

        Ok(())
    }
}

/// The email column is UNIQUE; a concurrent registration that lost the race
/// reports a duplicate instead of a storage failure.
fn unique_email_error(e: sqlx::Error, email: &str, context: &str) -> Error {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::AlreadyExists(format!("Email already registered: {}", email))
        }
        _ => Error::Database(format!("{}: {}", context, e)),
    }
}
