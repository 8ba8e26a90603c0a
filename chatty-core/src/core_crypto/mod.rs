//! Cryptographic primitives for chatty
//!
//! - `random` - the single entry point for secure randomness
//! - `keys` - group key and IV newtypes
//! - `group_cipher` - per-message AES-256-CBC over a group's key
//! - `key_wrap` - X25519 sealing of a group key for a joining member

pub mod errors;
pub mod group_cipher;
pub mod key_wrap;
pub mod keys;
pub mod random;

pub use errors::{CryptoError, CryptoResult};
pub use group_cipher::GroupCipher;
pub use key_wrap::{unwrap_group_key, wrap_group_key, InviteKeyPair, WrapPublicKey};
pub use keys::{GroupIv, GroupKey, GROUP_IV_LEN, GROUP_KEY_LEN};
pub use random::{EntropySource, OsEntropy, RandomSource};
