//! Registration, login and identity lookup.

use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::user::{CredentialsRequest, User, normalize_email};
use crate::services::password::PasswordHasher;
use crate::services::token_service::{IssuedToken, TokenService};
use crate::store::UserStore;

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    hasher: PasswordHasher,
    tokens: TokenService,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: PasswordHasher,
        tokens: TokenService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            clock,
        }
    }

    /// Create an identity and sign a session token for it.
    ///
    /// # Process
    ///
    /// 1. Validate and normalize the email, check password length
    /// 2. Hash the password (off the async runtime)
    /// 3. Insert the user; the store rejects duplicate emails
    /// 4. Issue a token
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: email or password fails validation
    /// - `EmailTaken`: an identity with this email already exists
    pub async fn register(&self, request: CredentialsRequest) -> Result<(User, IssuedToken), AppError> {
        request
            .validate_for_registration()
            .map_err(AppError::InvalidRequest)?;

        let email = normalize_email(&request.email);

        // Skip the expensive hash when the email is obviously taken
        if self.users.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::EmailTaken);
        }

        let password_hash = self.hasher.hash_blocking(request.password).await?;

        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            created_at: self.clock.now(),
        };
        self.users.create_user(&user).await?;

        let token = self.tokens.issue(user.id, &user.email)?;

        tracing::info!(user_id = %user.id, "user registered");

        Ok((user, token))
    }

    /// Exchange email and password for a session token.
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn login(&self, request: CredentialsRequest) -> Result<IssuedToken, AppError> {
        let email = normalize_email(&request.email);

        let Some(user) = self.users.find_user_by_email(&email).await? else {
            tracing::debug!("login attempt for unknown email");
            return Err(AppError::InvalidCredentials);
        };

        let matches = self
            .hasher
            .verify_blocking(request.password, user.password_hash.clone())
            .await?;
        if !matches {
            tracing::debug!(user_id = %user.id, "login attempt with wrong password");
            return Err(AppError::InvalidCredentials);
        }

        Ok(self.tokens.issue(user.id, &user.email)?)
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<User, AppError> {
        self.users
            .find_user_by_id(user_id)
            .await?
            .ok_or(AppError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn service() -> (UserService, TokenService) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));
        let tokens = TokenService::new("test-secret", Duration::hours(24), clock.clone());
        let service = UserService::new(
            Arc::new(MemoryStore::new()),
            PasswordHasher::new(4), // bcrypt minimum cost
            tokens.clone(),
            clock,
        );
        (service, tokens)
    }

    fn creds(email: &str, password: &str) -> CredentialsRequest {
        CredentialsRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn register_issues_a_token_for_the_new_user() {
        let (service, tokens) = service();

        let (user, issued) = service
            .register(creds("Alice@Example.com", "password123"))
            .await
            .unwrap();

        assert_eq!(user.email, "alice@example.com");
        assert_ne!(user.password_hash, "password123");

        let claims = tokens.verify(&issued.token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, "alice@example.com");
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let (service, _) = service();

        service
            .register(creds("alice@example.com", "password123"))
            .await
            .unwrap();
        let result = service
            .register(creds("ALICE@example.com", "password456"))
            .await;

        assert!(matches!(result, Err(AppError::EmailTaken)));
    }

    #[tokio::test]
    async fn invalid_registration_input() {
        let (service, _) = service();
        let result = service.register(creds("alice@example.com", "short")).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn login_with_correct_password() {
        let (service, tokens) = service();
        let (user, _) = service
            .register(creds("alice@example.com", "password123"))
            .await
            .unwrap();

        let issued = service
            .login(creds("alice@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(tokens.verify(&issued.token).unwrap().user_id, user.id);
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (service, _) = service();
        service
            .register(creds("alice@example.com", "password123"))
            .await
            .unwrap();

        let wrong_password = service.login(creds("alice@example.com", "wrong-password")).await;
        let unknown_email = service.login(creds("bob@example.com", "password123")).await;

        assert!(matches!(wrong_password, Err(AppError::InvalidCredentials)));
        assert!(matches!(unknown_email, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn get_user_by_id() {
        let (service, _) = service();
        let (user, _) = service
            .register(creds("alice@example.com", "password123"))
            .await
            .unwrap();

        assert_eq!(service.get_user(user.id).await.unwrap().email, "alice@example.com");
        assert!(matches!(
            service.get_user(Uuid::new_v4()).await,
            Err(AppError::UserNotFound)
        ));
    }
}
