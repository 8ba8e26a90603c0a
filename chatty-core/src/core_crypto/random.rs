//! Secure random generation
//!
//! Every group key, group IV, invite code, ephemeral key and identifier in
//! chatty is drawn through [`RandomSource`]. The source never falls back to a
//! non-cryptographic generator: if the host cannot provide secure entropy the
//! call fails with [`CryptoError::EntropyUnavailable`] and the caller aborts.
//!
//! The same bytes can be requested in three shapes:
//! - `buffer(n)` - an owned raw byte buffer (`Box<[u8]>`)
//! - `array::<N>()` - a fixed-width array
//! - `vec(n)` - a growable list
//!
//! The shape carries no security meaning.

use super::errors::{CryptoError, CryptoResult};
use super::keys::{GroupIv, GroupKey, GROUP_IV_LEN, GROUP_KEY_LEN};
use rand::TryRngCore;
use std::sync::Arc;
use uuid::Uuid;

/// A provider of cryptographically secure bytes
pub trait EntropySource: Send + Sync {
    /// Fill `dest` entirely or fail
    fn try_fill(&self, dest: &mut [u8]) -> CryptoResult<()>;
}

/// Operating-system CSPRNG (`getrandom` under the hood)
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn try_fill(&self, dest: &mut [u8]) -> CryptoResult<()> {
        let mut rng = rand::rngs::OsRng;
        rng.try_fill_bytes(dest)
            .map_err(|e| CryptoError::EntropyUnavailable(e.to_string()))
    }
}

/// Cloneable handle over an [`EntropySource`]
#[derive(Clone)]
pub struct RandomSource {
    entropy: Arc<dyn EntropySource>,
}

impl RandomSource {
    /// Random source backed by the operating system
    pub fn os() -> Self {
        Self::with_entropy(Arc::new(OsEntropy))
    }

    /// Random source backed by a custom entropy provider
    pub fn with_entropy(entropy: Arc<dyn EntropySource>) -> Self {
        Self { entropy }
    }

    /// Fill a caller-provided slice
    pub fn fill(&self, dest: &mut [u8]) -> CryptoResult<()> {
        self.entropy.try_fill(dest)
    }

    /// `count` random bytes as a raw buffer
    pub fn buffer(&self, count: usize) -> CryptoResult<Box<[u8]>> {
        let mut buf = vec![0u8; count].into_boxed_slice();
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// `N` random bytes as a fixed-width array
    pub fn array<const N: usize>(&self) -> CryptoResult<[u8; N]> {
        let mut out = [0u8; N];
        self.fill(&mut out)?;
        Ok(out)
    }

    /// `count` random bytes as a growable list
    pub fn vec(&self, count: usize) -> CryptoResult<Vec<u8>> {
        let mut out = vec![0u8; count];
        self.fill(&mut out)?;
        Ok(out)
    }

    /// Fresh 32-byte group key
    pub fn group_key(&self) -> CryptoResult<GroupKey> {
        Ok(GroupKey::from_bytes(self.array::<GROUP_KEY_LEN>()?))
    }

    /// Fresh 16-byte group IV
    pub fn group_iv(&self) -> CryptoResult<GroupIv> {
        Ok(GroupIv::from_bytes(self.array::<GROUP_IV_LEN>()?))
    }

    /// Random (v4) UUID built from this source rather than the uuid crate's RNG
    pub fn uuid(&self) -> CryptoResult<Uuid> {
        Ok(uuid::Builder::from_random_bytes(self.array::<16>()?).into_uuid())
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::os()
    }
}

impl std::fmt::Debug for RandomSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomSource").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingEntropy, SeededEntropy};

    #[test]
    fn test_os_source_lengths() {
        let random = RandomSource::os();
        assert_eq!(random.buffer(7).unwrap().len(), 7);
        assert_eq!(random.vec(33).unwrap().len(), 33);
        assert_eq!(random.array::<16>().unwrap().len(), 16);
        assert!(random.vec(0).unwrap().is_empty());
    }

    #[test]
    fn test_os_source_is_not_constant() {
        let random = RandomSource::os();
        let a = random.array::<32>().unwrap();
        let b = random.array::<32>().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_group_material_sizes() {
        let random = RandomSource::os();
        assert_eq!(random.group_key().unwrap().as_bytes().len(), 32);
        assert_eq!(random.group_iv().unwrap().as_bytes().len(), 16);
    }

    #[test]
    fn test_uuid_is_v4() {
        let id = RandomSource::os().uuid().unwrap();
        assert_eq!(id.get_version_num(), 4);
    }

    #[test]
    fn test_entropy_failure_is_reported() {
        let random = RandomSource::with_entropy(Arc::new(FailingEntropy));
        assert!(matches!(random.vec(16), Err(CryptoError::EntropyUnavailable(_))));
        assert!(matches!(random.group_key(), Err(CryptoError::EntropyUnavailable(_))));
        assert!(matches!(random.uuid(), Err(CryptoError::EntropyUnavailable(_))));
    }

    #[test]
    fn test_seeded_source_is_reproducible() {
        let a = RandomSource::with_entropy(Arc::new(SeededEntropy::new(7)));
        let b = RandomSource::with_entropy(Arc::new(SeededEntropy::new(7)));
        assert_eq!(a.vec(64).unwrap(), b.vec(64).unwrap());
    }
}
