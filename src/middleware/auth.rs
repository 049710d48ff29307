//! Authentication gates.
//!
//! Two middleware functions guard the protected routes:
//! - [`token_auth_middleware`] accepts `Authorization: Bearer <token>`
//! - [`api_key_middleware`] accepts `X-API-Key: <key>`
//!
//! Both attach an [`Identity`] to the request extensions on success and
//! reject with HTTP 401 otherwise. The downstream handler never runs for a
//! rejected request.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::{AppError, AuthRejection};
use crate::services::token_service::TokenError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated caller.
///
/// Inserted into the request's extension map by either gate; handlers pull it
/// out with `Extension<Identity>`.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

/// Which API key authenticated the request (API-key gate only).
#[derive(Debug, Clone)]
pub struct ApiKeyContext {
    pub api_key_id: Uuid,
    pub name: String,
}

/// Extract the token from `Authorization: Bearer <token>`.
///
/// The header value must split on single spaces into exactly two parts, the
/// first being `Bearer`. Anything else is malformed.
fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthRejection> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthRejection::MissingHeader)?
        .to_str()
        .map_err(|_| AuthRejection::MalformedHeader)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthRejection::MalformedHeader),
    }
}

/// Session token gate.
///
/// # Flow
///
/// 1. No `Authorization` header: reject `authorization header required`
/// 2. Header not `Bearer <token>`: reject `invalid authorization header format`
/// 3. Verify the token signature and expiry
///    - expired: reject `token expired`
///    - anything else wrong: reject `invalid token`
/// 4. Attach `Identity` from the claims and call the next handler
///
/// No database lookup happens here.
pub async fn token_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers()).map_err(AppError::Unauthorized)?;

    let claims = state.tokens.verify(token).map_err(|e| {
        tracing::debug!(error = %e, "session token rejected");
        AppError::Unauthorized(match e {
            TokenError::Expired => AuthRejection::TokenExpired,
            TokenError::Malformed | TokenError::InvalidSignature => AuthRejection::InvalidToken,
        })
    })?;

    request.extensions_mut().insert(Identity {
        user_id: claims.user_id,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// API key gate.
///
/// # Flow
///
/// 1. No `X-API-Key` header: reject `api key header required`
/// 2. Validate the key (unknown, revoked and expired keys are rejected)
/// 3. Load the owning user
/// 4. Attach `Identity` and `ApiKeyContext`, then call the next handler
pub async fn api_key_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let material = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or(AppError::Unauthorized(AuthRejection::MissingApiKey))?;

    let key = state.api_keys.validate(material).await?;

    // A key whose owner is gone cannot authenticate anyone
    let user = state
        .users
        .get_user(key.user_id)
        .await
        .map_err(|e| match e {
            AppError::UserNotFound => AppError::InvalidApiKey,
            other => other,
        })?;

    request.extensions_mut().insert(Identity {
        user_id: user.id,
        email: user.email,
    });
    request.extensions_mut().insert(ApiKeyContext {
        api_key_id: key.id,
        name: key.name,
    });

    Ok(next.run(request).await)
}
