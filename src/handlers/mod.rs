//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, caller identity)
//! 2. Delegates to a service
//! 3. Returns HTTP response (JSON, status code)

use uuid::Uuid;

use crate::error::AppError;

/// API key lifecycle endpoints
pub mod api_keys;
/// Registration and login
pub mod auth;
/// Service health endpoint
pub mod health;
/// Identity lookup
pub mod users;
/// API-key authenticated identity echo
pub mod whoami;

/// Parse a path id, rejecting with the standard JSON 400 body.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidRequest(format!("invalid id: {raw}")))
}
