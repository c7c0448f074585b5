//! One-way password hashing and comparison (bcrypt).
//!
//! bcrypt is deliberately slow, so both operations run on the blocking pool.

/// Cost used for new hashes in production.
pub const DEFAULT_COST: u32 = 10;

/// Infrastructure failure while hashing or comparing. A wrong password is not an error.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("password hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self { cost: DEFAULT_COST }
    }
}

impl PasswordHasher {
    /// Create a hasher with a specific bcrypt cost (4..=31).
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    pub async fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        let plaintext = plaintext.to_owned();
        let cost = self.cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(plaintext, cost)).await??;
        Ok(hash)
    }

    /// Compare a plaintext password against a stored hash.
    ///
    /// Mismatch is `Ok(false)`; only a malformed hash or a failed task is an error.
    pub async fn compare(&self, plaintext: &str, hash: &str) -> Result<bool, CredentialError> {
        let plaintext = plaintext.to_owned();
        let hash = hash.to_owned();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(plaintext, &hash)).await??;
        Ok(matches)
    }

    /// Do the work of a `compare` at this hasher's cost, matching nothing.
    ///
    /// Used when there is no stored hash, so the caller's response time does
    /// not reveal that.
    pub async fn compare_nothing(&self, plaintext: &str) -> Result<bool, CredentialError> {
        self.hash(plaintext).await?;
        Ok(false)
    }
}
