//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::services::api_key_service::MAX_ACTIVE_API_KEYS;

/// Reason attached to a rejected request at one of the authentication gates.
///
/// Each reason has a stable machine code and a stable human message; clients
/// may rely on both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRejection {
    /// No `Authorization` header at all.
    MissingHeader,
    /// Header present but not `Bearer <token>`.
    MalformedHeader,
    /// Signature valid, `exp` in the past.
    TokenExpired,
    /// Anything else wrong with the token.
    InvalidToken,
    /// No `X-API-Key` header on an API-key protected route.
    MissingApiKey,
}

impl AuthRejection {
    pub fn code(self) -> &'static str {
        match self {
            AuthRejection::MissingHeader => "missing_authorization",
            AuthRejection::MalformedHeader => "invalid_authorization_format",
            AuthRejection::TokenExpired => "token_expired",
            AuthRejection::InvalidToken => "invalid_token",
            AuthRejection::MissingApiKey => "missing_api_key",
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            AuthRejection::MissingHeader => "authorization header required",
            AuthRejection::MalformedHeader => "invalid authorization header format",
            AuthRejection::TokenExpired => "token expired",
            AuthRejection::InvalidToken => "invalid token",
            AuthRejection::MissingApiKey => "api key header required",
        }
    }
}

/// Application-wide error type.
///
/// Every variant maps to one HTTP status and one machine-readable code.
///
/// # Error Categories
///
/// - **Input errors**: malformed bodies, bad path ids (400)
/// - **Authorization errors**: gate rejections, bad credentials, bad or
///   unusable API keys, quota exceeded, not-found-or-not-owned (401/403/404/409)
/// - **Storage and internal errors**: hidden behind a generic 500
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Non-SQL storage fault.
    #[error("Storage error: {0}")]
    Storage(String),

    /// bcrypt could not produce a digest (entropy source failure).
    #[error("Password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    /// A session token could not be signed.
    #[error("Token signing failed: {0}")]
    TokenIssue(#[from] jsonwebtoken::errors::Error),

    /// A blocking task (password hashing) panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// Request rejected by an authentication gate.
    #[error("{}", .0.reason())]
    Unauthorized(AuthRejection),

    /// Login with an unknown email or a wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Registration with an email that already has an identity.
    #[error("An account with this email already exists")]
    EmailTaken,

    /// Identity does not exist (or is not visible to the caller).
    #[error("User not found")]
    UserNotFound,

    /// Active key quota reached for this identity.
    #[error("Maximum number of active API keys ({}) reached", MAX_ACTIVE_API_KEYS)]
    TooManyApiKeys,

    /// The identity already owns a key with this name.
    #[error("An API key with this name already exists")]
    DuplicateKeyName,

    /// No key with this id owned by the caller.
    ///
    /// Deliberately identical for "missing" and "owned by someone else".
    #[error("API key not found")]
    ApiKeyNotFound,

    /// Presented key material matches no stored key.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Presented key exists but has been revoked.
    #[error("API key has been revoked")]
    ApiKeyRevoked,

    /// Presented key exists but is past its expiry.
    #[error("API key has expired")]
    ApiKeyExpired,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    /// The String contains details about what was invalid.
    #[error("Invalid request")]
    InvalidRequest(String),
}

impl AppError {
    /// HTTP status and machine code for this error.
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized(rejection) => (StatusCode::UNAUTHORIZED, rejection.code()),
            AppError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key"),
            AppError::ApiKeyRevoked => (StatusCode::UNAUTHORIZED, "api_key_revoked"),
            AppError::ApiKeyExpired => (StatusCode::UNAUTHORIZED, "api_key_expired"),
            AppError::TooManyApiKeys => (StatusCode::FORBIDDEN, "too_many_api_keys"),
            AppError::ApiKeyNotFound => (StatusCode::NOT_FOUND, "api_key_not_found"),
            AppError::UserNotFound => (StatusCode::NOT_FOUND, "user_not_found"),
            AppError::EmailTaken => (StatusCode::CONFLICT, "email_taken"),
            AppError::DuplicateKeyName => (StatusCode::CONFLICT, "duplicate_key_name"),
            AppError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::PasswordHash(_)
            | AppError::TokenIssue(_)
            | AppError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// Internal failures are logged here and replaced by a generic message so
/// that storage details never reach the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::InvalidRequest(msg) => msg.clone(),
            _ if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %self, "request failed with internal error");
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
