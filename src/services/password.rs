//! Password hashing with bcrypt.

use crate::error::AppError;

/// Salted, deliberately slow one-way password hashing.
///
/// The work factor is fixed at construction. Cost 14 takes on the order of a
/// second per call, so callers on the async runtime should go through
/// [`PasswordHasher::hash_blocking`] / [`PasswordHasher::verify_blocking`].
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password with a fresh random salt.
    ///
    /// Fails only if the system entropy source or cost is unusable.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    /// Check a password against a stored digest.
    ///
    /// A malformed digest is a mismatch, not an error.
    pub fn verify(&self, password: &str, digest: &str) -> bool {
        bcrypt::verify(password, digest).unwrap_or(false)
    }

    pub async fn hash_blocking(&self, password: String) -> Result<String, AppError> {
        let hasher = *self;
        tokio::task::spawn_blocking(move || hasher.hash(&password)).await?
    }

    pub async fn verify_blocking(&self, password: String, digest: String) -> Result<bool, AppError> {
        let hasher = *self;
        Ok(tokio::task::spawn_blocking(move || hasher.verify(&password, &digest)).await?)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(14)
    }
}
