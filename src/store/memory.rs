//! In-memory implementation of the store traits.
//!
//! All three record kinds live behind one lock, so every trait method is
//! atomic in the same way a single database transaction would be.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ApiKeyStore, AuditStore, UserStore};
use crate::error::AppError;
use crate::models::{
    api_key::{ApiKey, NewApiKey},
    audit::AuditEntry,
    user::User,
};

#[derive(Debug, Default)]
struct Inner {
    users: HashMap<Uuid, User>,
    /// Insertion order
    api_keys: Vec<ApiKey>,
    audit: Vec<AuditEntry>,
}

impl Inner {
    fn count_active(&self, user_id: Uuid) -> i64 {
        self.api_keys
            .iter()
            .filter(|k| k.user_id == user_id && !k.is_revoked)
            .count() as i64
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
    fail_audit_writes: Arc<AtomicBool>,
    fail_touches: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every audit insert fail with a storage error.
    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every `last_used_at` update fail with a storage error.
    pub fn set_fail_touches(&self, fail: bool) {
        self.fail_touches.store(fail, Ordering::SeqCst);
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.inner.read().await.audit.clone()
    }

    pub async fn api_key(&self, key_id: Uuid) -> Option<ApiKey> {
        self.inner
            .read()
            .await
            .api_keys
            .iter()
            .find(|k| k.id == key_id)
            .cloned()
    }

    /// Overwrite a key's expiry directly, bypassing the service layer.
    pub async fn set_expires_at(&self, key_id: Uuid, expires_at: Option<DateTime<Utc>>) {
        let mut inner = self.inner.write().await;
        if let Some(key) = inner.api_keys.iter_mut().find(|k| k.id == key_id) {
            key.expires_at = expires_at;
        }
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        if inner.users.values().any(|u| u.email == user.email) {
            return Err(AppError::EmailTaken);
        }

        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl ApiKeyStore for MemoryStore {
    async fn insert_api_key(&self, key: NewApiKey, max_active: i64) -> Result<ApiKey, AppError> {
        let mut inner = self.inner.write().await;

        if inner.count_active(key.user_id) >= max_active {
            return Err(AppError::TooManyApiKeys);
        }
        if inner.api_keys.iter().any(|k| k.key_hash == key.key_hash) {
            return Err(AppError::Storage("duplicate key_hash".to_string()));
        }

        let record = ApiKey::from(key);
        inner.api_keys.push(record.clone());
        Ok(record)
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        let inner = self.inner.read().await;

        // Reverse insertion order first so equal timestamps still list newest first
        let mut keys: Vec<ApiKey> = inner
            .api_keys
            .iter()
            .rev()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(keys)
    }

    async fn find_api_key(&self, user_id: Uuid, key_id: Uuid) -> Result<Option<ApiKey>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .api_keys
            .iter()
            .find(|k| k.id == key_id && k.user_id == user_id)
            .cloned())
    }

    async fn find_api_key_by_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<ApiKey>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .api_keys
            .iter()
            .find(|k| k.user_id == user_id && k.name == name)
            .cloned())
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .api_keys
            .iter()
            .find(|k| k.key_hash == key_hash)
            .cloned())
    }

    async fn revoke_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;

        match inner
            .api_keys
            .iter_mut()
            .find(|k| k.id == key_id && k.user_id == user_id)
        {
            Some(key) => {
                key.is_revoked = true;
                key.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rotate_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        replacement: NewApiKey,
        max_active: i64,
    ) -> Result<Option<ApiKey>, AppError> {
        let mut inner = self.inner.write().await;

        let Some(index) = inner
            .api_keys
            .iter()
            .position(|k| k.id == key_id && k.user_id == user_id)
        else {
            return Ok(None);
        };

        // Quota is judged as if the old key were already revoked
        let was_active = !inner.api_keys[index].is_revoked;
        let active_after_revoke = inner.count_active(user_id) - i64::from(was_active);
        if active_after_revoke >= max_active {
            return Err(AppError::TooManyApiKeys);
        }

        let old = &mut inner.api_keys[index];
        old.is_revoked = true;
        old.updated_at = replacement.created_at;

        let record = ApiKey::from(replacement);
        inner.api_keys.push(record.clone());
        Ok(Some(record))
    }

    async fn revoke_api_keys(&self, key_ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, AppError> {
        let mut inner = self.inner.write().await;

        let mut touched = 0;
        for key in inner.api_keys.iter_mut().filter(|k| key_ids.contains(&k.id)) {
            key.is_revoked = true;
            key.updated_at = at;
            touched += 1;
        }
        Ok(touched)
    }

    async fn touch_api_key(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        if self.fail_touches.load(Ordering::SeqCst) {
            return Err(AppError::Storage("touch disabled".to_string()));
        }

        let mut inner = self.inner.write().await;
        if let Some(key) = inner.api_keys.iter_mut().find(|k| k.id == key_id) {
            key.last_used_at = Some(at);
            key.updated_at = at;
        }
        Ok(())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<(), AppError> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(AppError::Storage("audit writes disabled".to_string()));
        }

        self.inner.write().await.audit.push(entry.clone());
        Ok(())
    }
}
