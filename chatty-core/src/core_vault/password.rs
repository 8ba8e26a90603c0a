//! Password hashing and password-based key derivation
//!
//! Both use Argon2id. The stored verifier is a PHC string (parameters and
//! salt embedded), so raising the work factor later does not invalidate
//! existing vaults. The blob key is derived separately with its own salt.

use super::errors::{VaultError, VaultResult};
use crate::core_crypto::RandomSource;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Argon2 salt length (128 bits)
pub const SALT_LEN: usize = 16;

/// Derived blob key length (AES-256)
pub const BLOB_KEY_LEN: usize = 32;

/// Upper bound accepted when reading parameters back from disk (1 GiB)
pub const MAX_MEMORY_KIB: u32 = 1024 * 1024;

/// Argon2id work factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    pub fn validate(&self) -> VaultResult<()> {
        if self.memory_kib > MAX_MEMORY_KIB {
            return Err(VaultError::PasswordHash(format!(
                "memory cost {} KiB exceeds {} KiB",
                self.memory_kib, MAX_MEMORY_KIB
            )));
        }
        self.params().map(|_| ())
    }

    fn params(&self) -> VaultResult<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, Some(BLOB_KEY_LEN))
            .map_err(|e| VaultError::PasswordHash(format!("Invalid Argon2 params: {}", e)))
    }

    fn argon2(&self) -> VaultResult<Argon2<'static>> {
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params()?))
    }
}

/// Hash a password into a PHC string for storage
pub fn hash_password(password: &str, kdf: &KdfParams, random: &RandomSource) -> VaultResult<String> {
    let salt_bytes = random.array::<SALT_LEN>()?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| VaultError::PasswordHash(e.to_string()))?;
    let hash = kdf
        .argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| VaultError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored PHC string
///
/// A mismatch is `Ok(false)`; an unparsable hash is an error.
pub fn verify_password(password: &str, stored: &str) -> VaultResult<bool> {
    let parsed = PasswordHash::new(stored.trim())
        .map_err(|e| VaultError::PasswordHash(format!("stored hash unreadable: {}", e)))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(VaultError::PasswordHash(e.to_string())),
    }
}

/// Derive the 256-bit blob encryption key from the password
pub fn derive_blob_key(
    password: &str,
    salt: &[u8],
    kdf: &KdfParams,
) -> VaultResult<Zeroizing<[u8; BLOB_KEY_LEN]>> {
    let mut key = Zeroizing::new([0u8; BLOB_KEY_LEN]);
    kdf.argon2()?
        .hash_password_into(password.as_bytes(), salt, key.as_mut())
        .map_err(|e| VaultError::PasswordHash(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}
