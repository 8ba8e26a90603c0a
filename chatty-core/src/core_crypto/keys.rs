//! Group key material
//!
//! A group is scoped by one 32-byte AES-256 key and one 16-byte IV for its
//! whole lifetime. Both are zeroized on drop and redacted from `Debug`.

use super::errors::{CryptoError, CryptoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Group key length in bytes (AES-256)
pub const GROUP_KEY_LEN: usize = 32;

/// Group IV length in bytes (one AES block)
pub const GROUP_IV_LEN: usize = 16;

/// Symmetric key shared by every member of a group
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct GroupKey([u8; GROUP_KEY_LEN]);

impl GroupKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; GROUP_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice, rejecting any other length
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; GROUP_KEY_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "group key must be {} bytes, got {}",
                GROUP_KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; GROUP_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroupKey(<redacted>)")
    }
}

/// CBC initialisation vector bound to a group
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct GroupIv([u8; GROUP_IV_LEN]);

impl GroupIv {
    pub fn from_bytes(bytes: [u8; GROUP_IV_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; GROUP_IV_LEN] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "group IV must be {} bytes, got {}",
                GROUP_IV_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; GROUP_IV_LEN] {
        &self.0
    }
}

impl fmt::Debug for GroupIv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroupIv(<redacted>)")
    }
}
