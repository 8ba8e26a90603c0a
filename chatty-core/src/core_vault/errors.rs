//! Error types for the local vault

use crate::core_crypto::CryptoError;
use thiserror::Error;

/// Result type for vault operations
pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    /// Password does not match the stored hash. Nothing was decrypted.
    #[error("Authentication failed")]
    AuthFailure,

    /// The stored blob could not be decrypted or parsed. Reported as corruption.
    #[error("Vault data is corrupt: {0}")]
    Decryption(String),

    #[error("Password must be at least {min} characters")]
    WeakPassword { min: usize },

    /// Mutation attempted before the stored vault was loaded
    #[error("Vault has not been loaded")]
    NotLoaded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::Serialization(err.to_string())
    }
}
