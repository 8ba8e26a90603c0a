//! Group message cipher
//!
//! AES-256-CBC with PKCS#7 padding over UTF-8 text. Ciphertext travels as
//! standard base64 so it fits the bulletin board's text fields.
//!
//! Two wire forms exist:
//!
//! ```text
//! static IV     base64( CBC(key, group_iv, pkcs7(plaintext)) )
//! per-message   base64( iv (16) || CBC(key, iv, pkcs7(plaintext)) )
//! ```
//!
//! Decoding errors, bad block alignment, bad padding and invalid UTF-8 all
//! collapse into the single [`CryptoError::PaddingOrFormat`] so callers (and
//! anyone watching them) cannot tell which check rejected the input.
//!
//! The cipher is stateless: the caller resolves key and IV from the selected
//! group for every call.

use super::errors::{CryptoError, CryptoResult};
use super::keys::{GroupIv, GroupKey, GROUP_IV_LEN};
use super::random::RandomSource;
use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// AES block size
const BLOCK_SIZE: usize = 16;

/// Stateless symmetric cipher for group messages
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupCipher;

impl GroupCipher {
    /// Encrypt `plaintext` under the group's key and static IV
    pub fn encrypt(plaintext: &str, key: &GroupKey, iv: &GroupIv) -> CryptoResult<String> {
        let ciphertext = encrypt_bytes(plaintext.as_bytes(), key, iv)?;
        Ok(STANDARD.encode(ciphertext))
    }

    /// Decrypt a static-IV ciphertext
    pub fn decrypt(ciphertext: &str, key: &GroupKey, iv: &GroupIv) -> CryptoResult<String> {
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CryptoError::PaddingOrFormat)?;
        decrypt_bytes(&bytes, key, iv)
    }

    /// Encrypt under a fresh random IV which is prepended to the ciphertext
    pub fn encrypt_with_fresh_iv(
        plaintext: &str,
        key: &GroupKey,
        random: &RandomSource,
    ) -> CryptoResult<String> {
        let iv = random.group_iv()?;
        let ciphertext = encrypt_bytes(plaintext.as_bytes(), key, &iv)?;

        let mut wire = Vec::with_capacity(GROUP_IV_LEN + ciphertext.len());
        wire.extend_from_slice(iv.as_bytes());
        wire.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(wire))
    }

    /// Decrypt a ciphertext produced by [`GroupCipher::encrypt_with_fresh_iv`]
    pub fn decrypt_with_prefixed_iv(ciphertext: &str, key: &GroupKey) -> CryptoResult<String> {
        let bytes = STANDARD
            .decode(ciphertext.trim())
            .map_err(|_| CryptoError::PaddingOrFormat)?;
        if bytes.len() < GROUP_IV_LEN + BLOCK_SIZE {
            return Err(CryptoError::PaddingOrFormat);
        }
        let (iv_bytes, body) = bytes.split_at(GROUP_IV_LEN);
        let iv = GroupIv::from_slice(iv_bytes).map_err(|_| CryptoError::PaddingOrFormat)?;
        decrypt_bytes(body, key, &iv)
    }
}

fn encrypt_bytes(plaintext: &[u8], key: &GroupKey, iv: &GroupIv) -> CryptoResult<Vec<u8>> {
    let encryptor = Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| CryptoError::InvalidKeyMaterial(e.to_string()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn decrypt_bytes(ciphertext: &[u8], key: &GroupKey, iv: &GroupIv) -> CryptoResult<String> {
    // Alignment is checked before any block is decrypted; nothing here depends on the key.
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::PaddingOrFormat);
    }

    let decryptor = Aes256CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|_| CryptoError::PaddingOrFormat)?;
    let plaintext = decryptor
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::PaddingOrFormat)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::PaddingOrFormat)
}
