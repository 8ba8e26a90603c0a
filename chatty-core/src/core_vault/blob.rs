//! Encrypted vault blob format
//!
//! ```text
//! [Magic: 8 bytes "CHVT0001"]
//! [Version: 1 byte]
//! [Argon2 memory KiB: u32 LE][iterations: u32 LE][parallelism: u32 LE]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! The KDF parameters travel with the blob so a vault written under one
//! work factor stays readable after the configured factor changes. The
//! AEAD tag guarantees a damaged blob never decrypts to a partial mapping.

use super::errors::{VaultError, VaultResult};
use super::password::{derive_blob_key, KdfParams, SALT_LEN};
use crate::core_crypto::RandomSource;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

/// Magic header for vault blobs
const MAGIC_HEADER: &[u8; 8] = b"CHVT0001";

/// Current blob format version
const FORMAT_VERSION: u8 = 1;

/// Nonce length for AES-GCM (12 bytes = 96 bits)
const NONCE_LEN: usize = 12;

/// AES-GCM tag length
const TAG_LEN: usize = 16;

/// magic(8) + version(1) + params(12) + salt(16) + nonce(12) = 49 bytes
pub const HEADER_SIZE: usize = 8 + 1 + 12 + SALT_LEN + NONCE_LEN;

/// Parsed blob header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHeader {
    pub kdf: KdfParams,
    pub salt: [u8; SALT_LEN],
    pub nonce: [u8; NONCE_LEN],
}

impl BlobHeader {
    /// Parse and sanity-check the header without running the KDF
    pub fn parse(data: &[u8]) -> VaultResult<Self> {
        if data.len() < HEADER_SIZE + TAG_LEN {
            return Err(VaultError::Decryption("Truncated blob".to_string()));
        }
        if &data[0..8] != MAGIC_HEADER {
            return Err(VaultError::Decryption("Invalid magic header".to_string()));
        }
        let version = data[8];
        if version != FORMAT_VERSION {
            return Err(VaultError::Decryption(format!("Unsupported version: {}", version)));
        }

        let read_u32 = |offset: usize| -> VaultResult<u32> {
            let bytes: [u8; 4] = data[offset..offset + 4]
                .try_into()
                .map_err(|_| VaultError::Decryption("Truncated parameters".to_string()))?;
            Ok(u32::from_le_bytes(bytes))
        };
        let kdf = KdfParams {
            memory_kib: read_u32(9)?,
            iterations: read_u32(13)?,
            parallelism: read_u32(17)?,
        };
        kdf.validate()
            .map_err(|e| VaultError::Decryption(format!("Bad KDF parameters: {}", e)))?;

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&data[21..21 + SALT_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[21 + SALT_LEN..HEADER_SIZE]);

        Ok(Self { kdf, salt, nonce })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(MAGIC_HEADER);
        out.push(FORMAT_VERSION);
        out.extend_from_slice(&self.kdf.memory_kib.to_le_bytes());
        out.extend_from_slice(&self.kdf.iterations.to_le_bytes());
        out.extend_from_slice(&self.kdf.parallelism.to_le_bytes());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
    }
}

/// Encrypt `plaintext` under `password` with a fresh salt and nonce
pub fn seal(
    plaintext: &[u8],
    password: &str,
    kdf: &KdfParams,
    random: &RandomSource,
) -> VaultResult<Vec<u8>> {
    let header = BlobHeader {
        kdf: *kdf,
        salt: random.array::<SALT_LEN>()?,
        nonce: random.array::<NONCE_LEN>()?,
    };
    let key = derive_blob_key(password, &header.salt, kdf)?;

    let mut prefix = Vec::with_capacity(HEADER_SIZE);
    header.write(&mut prefix);

    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| VaultError::Serialization(format!("Invalid key: {}", e)))?;
    // The header is authenticated so parameters cannot be swapped underneath
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&header.nonce), Payload { msg: plaintext, aad: &prefix })
        .map_err(|e| VaultError::Serialization(format!("Encryption failed: {}", e)))?;

    let mut blob = prefix;
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a blob produced by [`seal`]
pub fn open(blob: &[u8], password: &str) -> VaultResult<Zeroizing<Vec<u8>>> {
    let header = BlobHeader::parse(blob)?;
    let key = derive_blob_key(password, &header.salt, &header.kdf)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_ref())
        .map_err(|e| VaultError::Decryption(format!("Invalid key: {}", e)))?;
    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&header.nonce),
            Payload { msg: &blob[HEADER_SIZE..], aad: &blob[..HEADER_SIZE] },
        )
        .map_err(|_| VaultError::Decryption("Integrity check failed".to_string()))?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fast_kdf, test_random};

    #[test]
    fn test_seal_open_roundtrip() {
        let blob = seal(b"{\"groups\":{}}", "password123", &fast_kdf(), &test_random()).unwrap();
        assert_eq!(&blob[0..8], MAGIC_HEADER);
        let opened = open(&blob, "password123").unwrap();
        assert_eq!(opened.as_slice(), b"{\"groups\":{}}");
    }

    #[test]
    fn test_header_carries_kdf() {
        let kdf = fast_kdf();
        let blob = seal(b"data", "password123", &kdf, &test_random()).unwrap();
        assert_eq!(BlobHeader::parse(&blob).unwrap().kdf, kdf);
    }

    #[test]
    fn test_wrong_password_is_corruption() {
        let blob = seal(b"data", "password123", &fast_kdf(), &test_random()).unwrap();
        assert!(matches!(open(&blob, "password124"), Err(VaultError::Decryption(_))));
    }

    #[test]
    fn test_corrupted_tag_and_body() {
        let blob = seal(b"some longer vault data", "password123", &fast_kdf(), &test_random()).unwrap();

        let mut tag = blob.clone();
        let len = tag.len();
        tag[len - 1] ^= 0xFF;
        assert!(matches!(open(&tag, "password123"), Err(VaultError::Decryption(_))));

        let mut body = blob.clone();
        body[HEADER_SIZE + 3] ^= 0x01;
        assert!(matches!(open(&body, "password123"), Err(VaultError::Decryption(_))));
    }

    #[test]
    fn test_tampered_header_is_rejected() {
        let mut blob = seal(b"data", "password123", &fast_kdf(), &test_random()).unwrap();
        // Bump iterations: still valid parameters, but the header is authenticated
        blob[13] = blob[13].wrapping_add(1);
        assert!(open(&blob, "password123").is_err());
    }

    #[test]
    fn test_bad_magic_and_truncation() {
        let blob = seal(b"data", "password123", &fast_kdf(), &test_random()).unwrap();

        let mut bad_magic = blob.clone();
        bad_magic[0] = b'X';
        assert!(BlobHeader::parse(&bad_magic).is_err());

        assert!(BlobHeader::parse(&blob[..HEADER_SIZE]).is_err());
        assert!(BlobHeader::parse(&[]).is_err());
    }

    #[test]
    fn test_absurd_memory_cost_is_rejected_before_kdf() {
        let mut blob = seal(b"data", "password123", &fast_kdf(), &test_random()).unwrap();
        blob[9..13].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(BlobHeader::parse(&blob), Err(VaultError::Decryption(_))));
    }
}
