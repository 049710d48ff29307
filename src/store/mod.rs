//! Persistence seams for users, API keys and audit entries.
//!
//! Services depend on these traits, never on a concrete database:
//! - [`postgres::PgStore`] backs the running server
//! - [`memory::MemoryStore`] backs tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    api_key::{ApiKey, NewApiKey},
    audit::AuditEntry,
    user::User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a user. Fails with `EmailTaken` on a duplicate email.
    async fn create_user(&self, user: &User) -> Result<(), AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    /// Cheap connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), AppError>;
}

#[async_trait]
pub trait ApiKeyStore: Send + Sync {
    /// Count the owner's unrevoked keys and insert `key` only if fewer than
    /// `max_active`, as one atomic step. Fails with `TooManyApiKeys`.
    async fn insert_api_key(&self, key: NewApiKey, max_active: i64) -> Result<ApiKey, AppError>;

    /// All of the owner's keys, newest first.
    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError>;

    /// The key `key_id` if it belongs to `user_id`, revoked or not.
    async fn find_api_key(&self, user_id: Uuid, key_id: Uuid) -> Result<Option<ApiKey>, AppError>;

    /// Any key of the owner with this name, revoked or not.
    async fn find_api_key_by_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<ApiKey>, AppError>;

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError>;

    /// Mark the key revoked if it exists and belongs to `user_id`.
    /// Returns false when no owned row matched.
    async fn revoke_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    /// Revoke the owned key `key_id` and insert `replacement` under the quota,
    /// as one atomic step. Returns `None` when no owned row matched, in which
    /// case nothing is written.
    async fn rotate_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        replacement: NewApiKey,
        max_active: i64,
    ) -> Result<Option<ApiKey>, AppError>;

    /// Revoke every listed key. Returns the number of rows touched.
    async fn revoke_api_keys(&self, key_ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, AppError>;

    async fn touch_api_key(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<(), AppError>;
}
