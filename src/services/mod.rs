//! Business logic services.
//!
//! Services contain the core rules separated from HTTP handlers. They talk to
//! persistence only through the traits in [`crate::store`].

pub mod api_key_service;
pub mod audit_service;
pub mod password;
pub mod token_service;
pub mod user_service;
