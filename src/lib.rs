//! Credential management and request authentication service.
//!
//! Users register and log in for short-lived session tokens, manage a small
//! set of long-lived API keys, and every authenticated request lands in an
//! access log.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
