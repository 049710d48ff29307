//! User (identity) model and authentication request/response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. `email` is unique across all users.
///
/// Never serialized outward: handlers convert to [`UserResponse`].
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub email: String,

    /// bcrypt digest of the user's password
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

/// Body of `POST /v1/api/auth/register` and `POST /v1/api/auth/login`.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

pub const MAX_EMAIL_LEN: usize = 255;
pub const MIN_PASSWORD_LEN: usize = 8;
/// bcrypt ignores input past this many bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Normalize an email for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl CredentialsRequest {
    /// Checks applied at registration only; login accepts whatever it is given.
    pub fn validate_for_registration(&self) -> Result<(), String> {
        let email = normalize_email(&self.email);
        if email.is_empty() || email.len() > MAX_EMAIL_LEN {
            return Err(format!("email must be 1 to {MAX_EMAIL_LEN} characters"));
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
            _ => return Err("email is not valid".to_string()),
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            ));
        }
        if self.password.len() > MAX_PASSWORD_BYTES {
            return Err(format!(
                "password must be at most {MAX_PASSWORD_BYTES} bytes"
            ));
        }
        Ok(())
    }
}

/// Session token handed back after register / login.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
}

/// Public view of a user.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[test]
    fn registration_validation() {
        assert!(request("a@example.com", "password123")
            .validate_for_registration()
            .is_ok());
        assert!(request("no-at-sign", "password123")
            .validate_for_registration()
            .is_err());
        assert!(request("@example.com", "password123")
            .validate_for_registration()
            .is_err());
        assert!(request("a@example.com", "short")
            .validate_for_registration()
            .is_err());
        assert!(request("a@example.com", &"p".repeat(73))
            .validate_for_registration()
            .is_err());
    }

    #[test]
    fn emails_are_case_insensitive() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn user_response_drops_the_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            password_hash: "$2b$04$...".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@example.com");
    }
}
