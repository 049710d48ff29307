//! PostgreSQL implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use super::{ApiKeyStore, AuditStore, UserStore};
use crate::db::DbPool;
use crate::error::AppError;
use crate::models::{
    api_key::{ApiKey, NewApiKey},
    audit::AuditEntry,
    user::User,
};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Take a row lock on the owning user for the rest of the transaction.
///
/// Every quota-checked insert goes through this lock first, so two concurrent
/// creations for the same user run one after the other.
async fn lock_owner(conn: &mut PgConnection, user_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(())
}

async fn count_active(conn: &mut PgConnection, user_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM api_keys WHERE user_id = $1 AND is_revoked = false")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
}

async fn insert_key(conn: &mut PgConnection, key: &NewApiKey) -> Result<ApiKey, sqlx::Error> {
    sqlx::query_as::<_, ApiKey>(
        r#"
        INSERT INTO api_keys (id, user_id, key_hash, name, is_revoked, expires_at, created_at, updated_at)
        VALUES ($1, $2, $3, $4, false, $5, $6, $6)
        RETURNING id, user_id, key_hash, name, is_revoked, expires_at, last_used_at, created_at, updated_at
        "#,
    )
    .bind(key.id)
    .bind(key.user_id)
    .bind(&key.key_hash)
    .bind(&key.name)
    .bind(key.expires_at)
    .bind(key.created_at)
    .fetch_one(&mut *conn)
    .await
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: &User) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                AppError::EmailTaken
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ApiKeyStore for PgStore {
    async fn insert_api_key(&self, key: NewApiKey, max_active: i64) -> Result<ApiKey, AppError> {
        let mut tx = self.pool.begin().await?;

        lock_owner(&mut tx, key.user_id).await?;

        if count_active(&mut tx, key.user_id).await? >= max_active {
            // Dropping the transaction rolls it back and releases the lock
            return Err(AppError::TooManyApiKeys);
        }

        let record = insert_key(&mut tx, &key).await?;
        tx.commit().await?;

        Ok(record)
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKey>, AppError> {
        let keys = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, key_hash, name, is_revoked, expires_at, last_used_at, created_at, updated_at
            FROM api_keys
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }

    async fn find_api_key(&self, user_id: Uuid, key_id: Uuid) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, key_hash, name, is_revoked, expires_at, last_used_at, created_at, updated_at
            FROM api_keys
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(key_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn find_api_key_by_name(
        &self,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, key_hash, name, is_revoked, expires_at, last_used_at, created_at, updated_at
            FROM api_keys
            WHERE user_id = $1 AND name = $2
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn find_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, AppError> {
        let key = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, user_id, key_hash, name, is_revoked, expires_at, last_used_at, created_at, updated_at
            FROM api_keys
            WHERE key_hash = $1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(key)
    }

    async fn revoke_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        // Filtering by both id and owner makes "not yours" look exactly like "missing"
        let result = sqlx::query(
            "UPDATE api_keys SET is_revoked = true, updated_at = $3 WHERE id = $1 AND user_id = $2",
        )
        .bind(key_id)
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn rotate_api_key(
        &self,
        user_id: Uuid,
        key_id: Uuid,
        replacement: NewApiKey,
        max_active: i64,
    ) -> Result<Option<ApiKey>, AppError> {
        let mut tx = self.pool.begin().await?;

        lock_owner(&mut tx, user_id).await?;

        let revoked = sqlx::query(
            "UPDATE api_keys SET is_revoked = true, updated_at = $3 WHERE id = $1 AND user_id = $2",
        )
        .bind(key_id)
        .bind(user_id)
        .bind(replacement.created_at)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            return Ok(None);
        }

        if count_active(&mut tx, user_id).await? >= max_active {
            return Err(AppError::TooManyApiKeys);
        }

        let record = insert_key(&mut tx, &replacement).await?;
        tx.commit().await?;

        Ok(Some(record))
    }

    async fn revoke_api_keys(&self, key_ids: &[Uuid], at: DateTime<Utc>) -> Result<u64, AppError> {
        if key_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE api_keys SET is_revoked = true, updated_at = $2 WHERE id = ANY($1)",
        )
        .bind(key_ids)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn touch_api_key(&self, key_id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE api_keys SET last_used_at = $2, updated_at = $2 WHERE id = $1")
            .bind(key_id)
            .bind(at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn insert_audit_entry(&self, entry: &AuditEntry) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO access_logs (
                id,
                user_id,
                method,
                path,
                status_code,
                ip_address,
                user_agent,
                duration_ms,
                timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(&entry.method)
        .bind(&entry.path)
        .bind(entry.status_code)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.duration_ms)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
