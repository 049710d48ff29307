//! API Key model and request/response types.
//!
//! API keys are long-lived credentials owned by one user. The key material is
//! shown to the owner exactly once; the database only ever holds its SHA-256 hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Represents an API key record from the database.
///
/// # Database Table
///
/// Maps to the `api_keys` table. Keys are never deleted; revocation and
/// expiry are soft state on the row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ApiKey {
    /// Unique identifier for this API key
    pub id: Uuid,

    /// Owning user
    pub user_id: Uuid,

    /// SHA-256 hash of the actual API key (64 hex characters)
    ///
    /// When a request comes in with "X-API-Key: abc123", we:
    /// 1. Hash "abc123" with SHA-256
    /// 2. Look up this hash in the database
    /// 3. Check revocation and expiry on the matched row
    pub key_hash: String,

    /// Display name, unique among the owner's keys
    pub name: String,

    /// Once true, never false again
    pub is_revoked: bool,

    pub expires_at: Option<DateTime<Utc>>,

    /// Updated on each successful validation (best effort)
    pub last_used_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// True when the key has an expiry at or before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// Fully-populated row about to be inserted.
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub id: Uuid,
    pub user_id: Uuid,
    pub key_hash: String,
    pub name: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<NewApiKey> for ApiKey {
    fn from(new: NewApiKey) -> Self {
        Self {
            id: new.id,
            user_id: new.user_id,
            key_hash: new.key_hash,
            name: new.name,
            is_revoked: false,
            expires_at: new.expires_at,
            last_used_at: None,
            created_at: new.created_at,
            updated_at: new.created_at,
        }
    }
}

/// A freshly generated key together with its plaintext material.
///
/// This is the only place the material exists after generation.
#[derive(Debug, Clone)]
pub struct IssuedApiKey {
    pub record: ApiKey,
    pub key: String,
}

/// Hash key material for storage and lookup.
pub fn hash_key(material: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(material.as_bytes());
    hex::encode(hasher.finalize())
}

/// Request body for `POST /v1/api/api-keys`.
///
/// ```json
/// { "name": "ci", "expires_in": 30 }
/// ```
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,

    /// Lifetime in days; absent means the key never expires.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

pub const MAX_KEY_NAME_LEN: usize = 100;
/// Longest lifetime a key may be created with (about a century).
pub const MAX_EXPIRES_IN_DAYS: i64 = 36_500;

impl CreateApiKeyRequest {
    /// Validate and normalize the request, returning the trimmed name.
    pub fn validate(&self) -> Result<String, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("name is required".to_string());
        }
        if name.chars().count() > MAX_KEY_NAME_LEN {
            return Err(format!("name must be at most {MAX_KEY_NAME_LEN} characters"));
        }
        if let Some(days) = self.expires_in {
            if !(1..=MAX_EXPIRES_IN_DAYS).contains(&days) {
                return Err(format!(
                    "expires_in must be between 1 and {MAX_EXPIRES_IN_DAYS} days"
                ));
            }
        }
        Ok(name.to_string())
    }
}

/// API key as returned to its owner.
///
/// # Security Note
///
/// The `key` field is ONLY included on create and rotate responses.
/// List operations never return key material.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub is_revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ApiKey> for ApiKeyResponse {
    fn from(key: ApiKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            key: None,
            is_revoked: key.is_revoked,
            expires_at: key.expires_at,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
            updated_at: key.updated_at,
        }
    }
}

impl From<IssuedApiKey> for ApiKeyResponse {
    fn from(issued: IssuedApiKey) -> Self {
        ApiKeyResponse::from(issued.record).with_key(issued.key)
    }
}

impl ApiKeyResponse {
    /// Include the plaintext material (create / rotate only).
    pub fn with_key(mut self, key: String) -> Self {
        self.key = Some(key);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn key(expires_at: Option<DateTime<Utc>>, is_revoked: bool) -> ApiKey {
        let now = Utc::now();
        ApiKey {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            key_hash: hash_key("material"),
            name: "ci".into(),
            is_revoked,
            expires_at,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let now = Utc::now();
        assert!(key(Some(now), false).is_expired_at(now));
        assert!(!key(Some(now + Duration::seconds(1)), false).is_expired_at(now));
        assert!(!key(None, false).is_expired_at(now));
    }

    #[test]
    fn hash_is_stable_hex() {
        let digest = hash_key("abc");
        assert_eq!(digest.len(), 64);
        assert_eq!(digest, hash_key("abc"));
        assert_ne!(digest, hash_key("abd"));
    }

    #[test]
    fn create_request_validation() {
        let ok = CreateApiKeyRequest {
            name: "  laptop ".into(),
            expires_in: Some(30),
        };
        assert_eq!(ok.validate().unwrap(), "laptop");

        let blank = CreateApiKeyRequest {
            name: "   ".into(),
            expires_in: None,
        };
        assert!(blank.validate().is_err());

        let zero_days = CreateApiKeyRequest {
            name: "ci".into(),
            expires_in: Some(0),
        };
        assert!(zero_days.validate().is_err());

        let century = CreateApiKeyRequest {
            name: "ci".into(),
            expires_in: Some(MAX_EXPIRES_IN_DAYS),
        };
        assert!(century.validate().is_ok());

        let forever = CreateApiKeyRequest {
            name: "ci".into(),
            expires_in: Some(i64::MAX),
        };
        assert!(forever.validate().is_err());

        let long = CreateApiKeyRequest {
            name: "x".repeat(101),
            expires_in: None,
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn list_response_omits_material() {
        let response = ApiKeyResponse::from(key(None, false));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("key").is_none());
        assert_eq!(json["is_revoked"], false);
    }
}
