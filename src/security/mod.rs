use crate::db::models::user_models::{AuthToken, User};
use crate::error::Error;
use crate::config::SecurityConfig;
use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

pub mod auth;
pub mod password;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User name
    pub name: String,
    /// User role at issue time; the stored role is authoritative
    pub role: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
}

impl Claims {
    /// Get the user ID from the claims
    pub fn user_id(&self) -> Result<i64, std::num::ParseIntError> {
        self.sub.parse::<i64>()
    }
}

/// Security service for issuing and validating tokens
#[derive(Clone)]
pub struct SecurityService {
    config: SecurityConfig,
}

impl SecurityService {
    /// Create a new security service
    pub fn new(config: SecurityConfig) -> Self {
        Self { config }
    }

    /// Generate a JWT token for a user
    pub fn generate_token(&self, user: &User) -> Result<AuthToken> {
        let now = Utc::now();
        let expiration = now + Duration::minutes(self.config.jwt_expiration_minutes as i64);

        let claims = Claims {
            sub: user.id.to_string(),
            name: user.username.clone(),
            role: user.role.as_str().to_string(),
            exp: expiration.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| Error::Internal(format!("Failed to generate JWT token: {}", e)))?;

        Ok(AuthToken {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.jwt_expiration_minutes * 60,
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| Error::Authentication(format!("Invalid token: {}", e)))?;

        Ok(token_data)
    }

    /// Extract user ID from validated token data
    pub fn get_user_id_from_token(&self, token_data: &TokenData<Claims>) -> Result<i64> {
        let user_id = token_data
            .claims
            .user_id()
            .map_err(|e| Error::Authentication(format!("Invalid user ID in token: {}", e)))?;

        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::user_models::{UserRole, UserStatus};

    fn user() -> User {
        User {
            id: 42,
            username: "ops@example.com".into(),
            email: "ops@example.com".into(),
            password_hash: String::new(),
            name: "Ops".into(),
            role: UserRole::Manager,
            status: UserStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login: None,
        }
    }

    #[test]
    fn issued_token_validates() {
        let service = SecurityService::new(SecurityConfig::default());
        let token = service.generate_token(&user()).unwrap();
        assert_eq!(token.token_type, "Bearer");

        let data = service.validate_token(&token.access_token).unwrap();
        assert_eq!(service.get_user_id_from_token(&data).unwrap(), 42);
        assert_eq!(data.claims.role, "MANAGER");
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let issuer = SecurityService::new(SecurityConfig {
            jwt_secret: "one".into(),
            ..SecurityConfig::default()
        });
        let verifier = SecurityService::new(SecurityConfig {
            jwt_secret: "two".into(),
            ..SecurityConfig::default()
        });
        let token = issuer.generate_token(&user()).unwrap();
        let err = verifier.validate_token(&token.access_token).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Authentication(_))));
    }
}
