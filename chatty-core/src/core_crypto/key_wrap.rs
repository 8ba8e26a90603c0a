//! Asymmetric wrapping of a group key for one recipient
//!
//! A prospective member publishes an X25519 public key with its join
//! request. A member who accepts seals the group's `key || iv` to that key:
//!
//! ```text
//! ephemeral_pk (32) || nonce (12) || AES-256-GCM(k, key || iv) + tag (16)
//!
//! k = HKDF-SHA256(ikm = X25519(ephemeral_sk, recipient_pk), info = WRAP_INFO)
//! aad = invite code
//! ```
//!
//! Binding the invite code as AAD means a wrapped key answered for one
//! request cannot be replayed under another code.

use super::errors::{CryptoError, CryptoResult};
use super::keys::{GroupIv, GroupKey, GROUP_IV_LEN, GROUP_KEY_LEN};
use super::random::RandomSource;
use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hkdf::Hkdf;
use sha2::Sha256;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

/// HKDF info label for the wrap key
const WRAP_INFO: &[u8] = b"chatty group key wrap v1";

/// X25519 key length
const X25519_LEN: usize = 32;

/// AES-GCM nonce size (96 bits)
const NONCE_SIZE: usize = 12;

/// AES-GCM tag size
const TAG_SIZE: usize = 16;

/// Exact length of a wrapped group key
pub const WRAPPED_LEN: usize = X25519_LEN + NONCE_SIZE + GROUP_KEY_LEN + GROUP_IV_LEN + TAG_SIZE;

/// Public half of an invite keypair, as published in a join request
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WrapPublicKey(PublicKey);

impl WrapPublicKey {
    pub fn from_bytes(bytes: [u8; X25519_LEN]) -> Self {
        Self(PublicKey::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; X25519_LEN] {
        self.0.as_bytes()
    }

    /// Text form carried in the join request content field
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0.as_bytes())
    }

    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::InvalidKeyMaterial(format!("public key: {}", e)))?;
        let array: [u8; X25519_LEN] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKeyMaterial(format!(
                "public key must be {} bytes, got {}",
                X25519_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(array))
    }
}

impl fmt::Debug for WrapPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrapPublicKey({})", hex::encode(&self.as_bytes()[..8]))
    }
}

/// Ephemeral X25519 keypair generated per join request
///
/// The secret never leaves the requesting device.
pub struct InviteKeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl InviteKeyPair {
    /// Generate a fresh keypair from the random source
    pub fn generate(random: &RandomSource) -> CryptoResult<Self> {
        let seed = Zeroizing::new(random.array::<X25519_LEN>()?);
        Ok(Self::from_secret_bytes(*seed))
    }

    /// Rebuild a keypair from persisted secret bytes
    pub fn from_secret_bytes(bytes: [u8; X25519_LEN]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    pub fn public_key(&self) -> WrapPublicKey {
        WrapPublicKey(self.public)
    }

    /// Secret bytes for local persistence
    pub fn secret_bytes(&self) -> Zeroizing<[u8; X25519_LEN]> {
        Zeroizing::new(self.secret.to_bytes())
    }
}

impl fmt::Debug for InviteKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InviteKeyPair")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

fn derive_wrap_key(shared: &[u8; 32]) -> CryptoResult<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, shared);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(WRAP_INFO, key.as_mut())
        .map_err(|e| CryptoError::KeyWrap(format!("HKDF expand failed: {}", e)))?;
    Ok(key)
}

/// Seal a group's key and IV to `recipient`
pub fn wrap_group_key(
    recipient: &WrapPublicKey,
    key: &GroupKey,
    iv: &GroupIv,
    context: &[u8],
    random: &RandomSource,
) -> CryptoResult<Vec<u8>> {
    let ephemeral = InviteKeyPair::generate(random)?;
    let shared = ephemeral.secret.diffie_hellman(&recipient.0);
    if !shared.was_contributory() {
        return Err(CryptoError::KeyWrap("recipient key is a low-order point".to_string()));
    }
    let wrap_key = derive_wrap_key(shared.as_bytes())?;

    let nonce_bytes = random.array::<NONCE_SIZE>()?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut payload = Zeroizing::new(Vec::with_capacity(GROUP_KEY_LEN + GROUP_IV_LEN));
    payload.extend_from_slice(key.as_bytes());
    payload.extend_from_slice(iv.as_bytes());

    let cipher = Aes256Gcm::new_from_slice(wrap_key.as_ref())
        .map_err(|e| CryptoError::KeyWrap(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(nonce, Payload { msg: payload.as_slice(), aad: context })
        .map_err(|e| CryptoError::KeyWrap(e.to_string()))?;

    let mut wrapped = Vec::with_capacity(WRAPPED_LEN);
    wrapped.extend_from_slice(ephemeral.public.as_bytes());
    wrapped.extend_from_slice(&nonce_bytes);
    wrapped.extend_from_slice(&ciphertext);
    Ok(wrapped)
}

/// Open a wrapped group key with the requester's keypair
pub fn unwrap_group_key(
    keypair: &InviteKeyPair,
    wrapped: &[u8],
    context: &[u8],
) -> CryptoResult<(GroupKey, GroupIv)> {
    if wrapped.len() != WRAPPED_LEN {
        return Err(CryptoError::UnwrapFailed);
    }

    let (ephemeral_bytes, rest) = wrapped.split_at(X25519_LEN);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let ephemeral_array: [u8; X25519_LEN] =
        ephemeral_bytes.try_into().map_err(|_| CryptoError::UnwrapFailed)?;
    let ephemeral_pk = PublicKey::from(ephemeral_array);

    let shared = keypair.secret.diffie_hellman(&ephemeral_pk);
    if !shared.was_contributory() {
        return Err(CryptoError::UnwrapFailed);
    }
    let wrap_key = derive_wrap_key(shared.as_bytes())?;

    let cipher =
        Aes256Gcm::new_from_slice(wrap_key.as_ref()).map_err(|_| CryptoError::UnwrapFailed)?;
    let payload = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce_bytes), Payload { msg: ciphertext, aad: context })
            .map_err(|_| CryptoError::UnwrapFailed)?,
    );

    let (key_bytes, iv_bytes) = payload.split_at(GROUP_KEY_LEN);
    let key = GroupKey::from_slice(key_bytes).map_err(|_| CryptoError::UnwrapFailed)?;
    let iv = GroupIv::from_slice(iv_bytes).map_err(|_| CryptoError::UnwrapFailed)?;
    Ok((key, iv))
}
