//! Audit entry model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

const MAX_PATH_LEN: usize = 500;
const MAX_USER_AGENT_LEN: usize = 500;
const MAX_IP_LEN: usize = 45;

/// One completed authenticated request.
///
/// # Database Table
///
/// Maps to the append-only `access_logs` table. Entries are written once by
/// the audit workers and never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct AuditEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method: String,
    pub path: String,
    pub status_code: i32,
    pub ip_address: String,
    pub user_agent: String,
    pub duration_ms: i64,
    pub timestamp: DateTime<Utc>,
}

/// Request facts captured by the audit middleware, before persistence.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    pub user_id: Uuid,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub ip_address: String,
    pub user_agent: String,
    pub duration_ms: i64,
}

impl AuditEntry {
    /// Build an entry stamped at `timestamp`, clipping free-text fields to column widths.
    pub fn from_record(record: RequestRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            method: record.method,
            path: clip(record.path, MAX_PATH_LEN),
            status_code: i32::from(record.status_code),
            ip_address: clip(record.ip_address, MAX_IP_LEN),
            user_agent: clip(record.user_agent, MAX_USER_AGENT_LEN),
            duration_ms: record.duration_ms,
            timestamp,
        }
    }
}

fn clip(mut value: String, max_chars: usize) -> String {
    if let Some((idx, _)) = value.char_indices().nth(max_chars) {
        value.truncate(idx);
    }
    value
}
