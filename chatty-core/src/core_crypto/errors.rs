//! Error types for the crypto layer

use thiserror::Error;

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors raised by random generation, the group cipher and key wrapping
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No secure entropy source could be read. Never degraded to a weaker RNG.
    #[error("Secure entropy unavailable: {0}")]
    EntropyUnavailable(String),

    /// Malformed ciphertext, bad padding or wrong key/IV. Deliberately opaque.
    #[error("Ciphertext is malformed or does not match the key")]
    PaddingOrFormat,

    /// Key or IV of the wrong shape
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Wrapping a group key for a recipient failed
    #[error("Key wrap failed: {0}")]
    KeyWrap(String),

    /// A wrapped group key could not be opened with the local private key
    #[error("Wrapped key could not be opened")]
    UnwrapFailed,
}
