//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `JWT_SECRET` (required): HMAC secret used to sign session tokens
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8080
/// - `BCRYPT_COST` (optional): password hashing work factor, defaults to 14
/// - `TOKEN_TTL_HOURS` (optional): session token lifetime, defaults to 24
/// - `REQUEST_TIMEOUT_SECS` (optional): per-request deadline, defaults to 60
/// - `AUDIT_QUEUE_CAPACITY` (optional): pending audit entries before drops, defaults to 1024
/// - `AUDIT_WORKERS` (optional): concurrent audit writers, defaults to 4
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
#[derive(Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    pub jwt_secret: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_audit_queue_capacity")]
    pub audit_queue_capacity: usize,

    #[serde(default = "default_audit_workers")]
    pub audit_workers: usize,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
}

// Secrets stay out of logs even when the whole config is debug-printed.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[hidden]")
            .field("jwt_secret", &"[hidden]")
            .field("server_port", &self.server_port)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("audit_queue_capacity", &self.audit_queue_capacity)
            .field("audit_workers", &self.audit_workers)
            .field("database_max_connections", &self.database_max_connections)
            .finish()
    }
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    8080
}

fn default_bcrypt_cost() -> u32 {
    14
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_audit_queue_capacity() -> usize {
    1024
}

fn default_audit_workers() -> usize {
    4
}

fn default_max_connections() -> u32 {
    5
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL, JWT_SECRET)
    /// - Environment variable values cannot be parsed into expected types
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    /// Session token lifetime, or `None` when `TOKEN_TTL_HOURS` is not a
    /// positive, representable number of hours.
    pub fn token_ttl(&self) -> Option<chrono::Duration> {
        chrono::Duration::try_hours(self.token_ttl_hours).filter(|ttl| *ttl > chrono::Duration::zero())
    }

    /// Build configuration from explicit key/value pairs (upper-case keys).
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Config>(pairs)
    }
}
