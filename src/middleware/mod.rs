//! HTTP middleware components.
//!
//! Middleware are functions that run before route handlers.
//! They can:
//! - Authenticate requests and attach the caller's identity
//! - Record completed requests for the access log
//! - Short-circuit requests (reject unauthorized)

/// Session token and API key gates
pub mod auth;

/// Access logging for authenticated requests
pub mod audit;
