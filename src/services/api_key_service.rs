//! API key lifecycle: generation, listing, revocation, rotation, validation
//! and the lazy expiry sweep.
//!
//! # Quota
//!
//! A user may hold at most [`MAX_ACTIVE_API_KEYS`] unrevoked keys. The check
//! and the insert happen in one store call, so concurrent creations cannot
//! overshoot the limit.
//!
//! # Names
//!
//! This service does not enforce name uniqueness. Callers check
//! [`ApiKeyService::find_by_name`] before calling [`ApiKeyService::generate`].

use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::AppError;
use crate::models::api_key::{ApiKey, IssuedApiKey, NewApiKey, hash_key};
use crate::store::ApiKeyStore;

pub const MAX_ACTIVE_API_KEYS: i64 = 3;

#[derive(Clone)]
pub struct ApiKeyService {
    store: Arc<dyn ApiKeyStore>,
    clock: Arc<dyn Clock>,
}

impl ApiKeyService {
    pub fn new(store: Arc<dyn ApiKeyStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create a new key for `user_id`.
    ///
    /// # Process
    ///
    /// 1. Generate 32 random bytes, hex-encoded (64 chars), as key material
    /// 2. Compute expiry from a positive day count, otherwise none
    /// 3. Insert under the active-key quota
    /// 4. Return the record together with the plaintext material
    ///
    /// # Errors
    ///
    /// - `InvalidRequest`: the expiry does not fit in a timestamp
    /// - `TooManyApiKeys`: the user already holds the maximum of unrevoked keys
    /// - `Database` / `Storage`: persistence failed
    pub async fn generate(
        &self,
        user_id: Uuid,
        name: &str,
        expires_in_days: Option<i64>,
    ) -> Result<IssuedApiKey, AppError> {
        let (new_key, material) = self.new_key(user_id, name, expires_in_days)?;

        let record = self
            .store
            .insert_api_key(new_key, MAX_ACTIVE_API_KEYS)
            .await?;

        tracing::info!(user_id = %user_id, key_id = %record.id, "API key generated");

        Ok(IssuedApiKey {
            record,
            key: material,
        })
    }

    /// All of the user's keys in any state, newest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        self.store.list_api_keys(user_id).await
    }

    /// Look up one of the user's keys by name, revoked or not.
    pub async fn find_by_name(&self, user_id: Uuid, name: &str) -> Result<Option<ApiKey>, AppError> {
        self.store.find_api_key_by_name(user_id, name).await
    }

    /// Revoke a key owned by `user_id`.
    ///
    /// A key owned by someone else fails exactly like a missing one.
    pub async fn revoke(&self, user_id: Uuid, key_id: Uuid) -> Result<(), AppError> {
        let now = self.clock.now();

        if !self.store.revoke_api_key(user_id, key_id, now).await? {
            return Err(AppError::ApiKeyNotFound);
        }

        tracing::info!(user_id = %user_id, key_id = %key_id, "API key revoked");
        Ok(())
    }

    /// Revoke a key and issue a replacement with the same name and no expiry.
    ///
    /// Both steps are committed together or not at all.
    pub async fn rotate(&self, user_id: Uuid, key_id: Uuid) -> Result<IssuedApiKey, AppError> {
        let existing = self
            .store
            .find_api_key(user_id, key_id)
            .await?
            .ok_or(AppError::ApiKeyNotFound)?;

        let (replacement, material) = self.new_key(user_id, &existing.name, None)?;

        let record = self
            .store
            .rotate_api_key(user_id, key_id, replacement, MAX_ACTIVE_API_KEYS)
            .await?
            .ok_or(AppError::ApiKeyNotFound)?;

        tracing::info!(
            user_id = %user_id,
            old_key_id = %key_id,
            new_key_id = %record.id,
            "API key rotated"
        );

        Ok(IssuedApiKey {
            record,
            key: material,
        })
    }

    /// Resolve presented key material to a usable key.
    ///
    /// On success `last_used_at` is bumped on a best-effort basis; a failed
    /// update is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// - `InvalidApiKey`: no key matches
    /// - `ApiKeyRevoked`: matched, revoked
    /// - `ApiKeyExpired`: matched, unrevoked, expiry not in the future
    pub async fn validate(&self, material: &str) -> Result<ApiKey, AppError> {
        let mut key = self
            .store
            .find_api_key_by_hash(&hash_key(material))
            .await?
            .ok_or(AppError::InvalidApiKey)?;

        if key.is_revoked {
            return Err(AppError::ApiKeyRevoked);
        }

        let now = self.clock.now();
        if key.is_expired_at(now) {
            return Err(AppError::ApiKeyExpired);
        }

        match self.store.touch_api_key(key.id, now).await {
            Ok(()) => {
                key.last_used_at = Some(now);
                key.updated_at = now;
            }
            Err(e) => {
                tracing::warn!(key_id = %key.id, error = %e, "failed to record API key use");
            }
        }

        Ok(key)
    }

    /// Revoke every unrevoked key of `user_id` whose expiry has passed.
    ///
    /// Runs lazily before listing rather than on a schedule. Returns how many
    /// keys were revoked.
    pub async fn sweep_expired(&self, user_id: Uuid) -> Result<u64, AppError> {
        let now = self.clock.now();

        let expired: Vec<Uuid> = self
            .store
            .list_api_keys(user_id)
            .await?
            .into_iter()
            .filter(|k| !k.is_revoked && k.is_expired_at(now))
            .map(|k| k.id)
            .collect();

        if expired.is_empty() {
            return Ok(0);
        }

        let revoked = self.store.revoke_api_keys(&expired, now).await?;
        tracing::info!(user_id = %user_id, count = revoked, "revoked expired API keys");

        Ok(revoked)
    }

    fn new_key(
        &self,
        user_id: Uuid,
        name: &str,
        expires_in_days: Option<i64>,
    ) -> Result<(NewApiKey, String), AppError> {
        let now = self.clock.now();

        let expires_at = match expires_in_days.filter(|days| *days > 0) {
            Some(days) => Some(
                Duration::try_days(days)
                    .and_then(|lifetime| now.checked_add_signed(lifetime))
                    .ok_or_else(|| {
                        AppError::InvalidRequest(format!("expires_in of {days} days is out of range"))
                    })?,
            ),
            None => None,
        };

        let material = generate_key_material();

        let new_key = NewApiKey {
            id: Uuid::new_v4(),
            user_id,
            key_hash: hash_key(&material),
            name: name.to_string(),
            expires_at,
            created_at: now,
        };

        Ok((new_key, material))
    }
}

/// Generate cryptographically secure key material.
///
/// # Output
///
/// 64 hex characters (32 random bytes)
fn generate_key_material() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}
