//! HTTP handlers for API key management.
//!
//! All routes here sit behind the session token gate and act on the
//! caller's own keys only.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use crate::error::AppError;
use crate::extract::Json as JsonBody;
use crate::handlers::parse_id;
use crate::middleware::auth::Identity;
use crate::models::api_key::{ApiKeyResponse, CreateApiKeyRequest};
use crate::state::AppState;

/// Create a new API key.
///
/// # Request Body
///
/// ```json
/// {
///   "name": "ci",
///   "expires_in": 30
/// }
/// ```
///
/// `expires_in` is a day count and may be omitted for a key that never expires.
///
/// # Response
///
/// Returns 201 Created. The `key` is only returned here and on rotation.
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "ci",
///   "key": "a1b2c3d4e5f6...",
///   "is_revoked": false,
///   "expires_at": "2025-02-14T10:30:00Z",
///   "last_used_at": null,
///   "created_at": "2025-01-15T10:30:00Z",
///   "updated_at": "2025-01-15T10:30:00Z"
/// }
/// ```
///
/// # Errors
///
/// - 400 for a malformed body, an empty or overlong name, or an `expires_in`
///   outside 1 to 36500 days
/// - 409 if the caller already has a key with this name (revoked keys included)
/// - 403 if the caller already holds the maximum number of active keys
pub async fn create_api_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    JsonBody(request): JsonBody<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let name = request.validate().map_err(AppError::InvalidRequest)?;

    if state
        .api_keys
        .find_by_name(identity.user_id, &name)
        .await?
        .is_some()
    {
        return Err(AppError::DuplicateKeyName);
    }

    let issued = state
        .api_keys
        .generate(identity.user_id, &name, request.expires_in)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiKeyResponse::from(issued))))
}

/// List the caller's keys, newest first.
///
/// Expired keys are revoked first. A failure there is logged and the list is
/// still returned. Key material is never included.
pub async fn list_api_keys(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ApiKeyResponse>>, AppError> {
    if let Err(e) = state.api_keys.sweep_expired(identity.user_id).await {
        tracing::error!(user_id = %identity.user_id, error = %e, "expired key sweep failed");
    }

    let keys = state.api_keys.list(identity.user_id).await?;

    Ok(Json(keys.into_iter().map(ApiKeyResponse::from).collect()))
}

/// Revoke one of the caller's keys.
///
/// Returns 404 if the key does not exist or belongs to someone else.
pub async fn revoke_api_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let key_id = parse_id(&raw_id)?;

    state.api_keys.revoke(identity.user_id, key_id).await?;

    Ok(Json(json!({ "message": "API key revoked successfully" })))
}

/// Replace one of the caller's keys with fresh material under the same name.
///
/// The old key is revoked; the response carries the new `key` once.
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiKeyResponse>, AppError> {
    let key_id = parse_id(&raw_id)?;

    let issued = state.api_keys.rotate(identity.user_id, key_id).await?;

    Ok(Json(ApiKeyResponse::from(issued)))
}
