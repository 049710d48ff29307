//! Identity lookup.

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::error::AppError;
use crate::handlers::parse_id;
use crate::middleware::auth::Identity;
use crate::models::user::UserResponse;
use crate::state::AppState;

/// Fetch a user profile.
///
/// Callers can only see themselves; any other id answers 404 exactly like a
/// missing user.
pub async fn get_user(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(raw_id): Path<String>,
) -> Result<Json<UserResponse>, AppError> {
    let user_id = parse_id(&raw_id)?;

    if user_id != identity.user_id {
        return Err(AppError::UserNotFound);
    }

    let user = state.users.get_user(user_id).await?;

    Ok(Json(user.into()))
}
