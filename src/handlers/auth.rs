//! Registration and login.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::error::AppError;
use crate::extract::Json as JsonBody;
use crate::models::user::{CredentialsRequest, TokenResponse};
use crate::services::token_service::IssuedToken;
use crate::state::AppState;

fn token_response(issued: IssuedToken) -> TokenResponse {
    TokenResponse {
        token: issued.token,
        token_type: "Bearer".to_string(),
        expires_at: issued.expires_at,
    }
}

/// Create an account.
///
/// # Request Body
///
/// ```json
/// { "email": "alice@example.com", "password": "correct horse" }
/// ```
///
/// # Response
///
/// 201 Created with a session token:
///
/// ```json
/// { "token": "eyJ...", "token_type": "Bearer", "expires_at": "2025-01-16T10:30:00Z" }
/// ```
///
/// 409 if the email is already registered, 400 on invalid input or a
/// malformed body.
pub async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (_, issued) = state.users.register(request).await?;

    Ok((StatusCode::CREATED, Json(token_response(issued))))
}

/// Exchange credentials for a session token.
///
/// Returns 401 `invalid_credentials` for an unknown email and for a wrong
/// password alike.
pub async fn login(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CredentialsRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let issued = state.users.login(request).await?;

    Ok(Json(token_response(issued)))
}
