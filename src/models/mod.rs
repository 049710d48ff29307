//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request and response bodies built from them.

/// API key model
pub mod api_key;
/// Audit entry model
pub mod audit;
/// User (identity) model
pub mod user;
