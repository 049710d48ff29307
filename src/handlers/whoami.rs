//! Echo the caller resolved by the API-key gate.

use axum::{Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::middleware::auth::{ApiKeyContext, Identity};

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub user_id: Uuid,
    pub email: String,
    pub api_key_id: Uuid,
    pub api_key_name: String,
}

pub async fn whoami(
    Extension(identity): Extension<Identity>,
    Extension(key): Extension<ApiKeyContext>,
) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        user_id: identity.user_id,
        email: identity.email,
        api_key_id: key.api_key_id,
        api_key_name: key.name,
    })
}
