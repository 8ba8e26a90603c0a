/*!
    Deterministic entropy for reproducible tests

    `SeededEntropy` feeds a `RandomSource` from a seeded `StdRng` so that
    keys, IVs and invite codes can be replayed across runs. It is a test
    double only: nothing in the library constructs it.

    `FailingEntropy` models a host with no secure entropy available.
*/

use crate::core_crypto::{CryptoError, CryptoResult, EntropySource, RandomSource};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex};

/// Default seed for deterministic tests
pub const DEFAULT_TEST_SEED: u64 = 42;

/// Seeded, reproducible entropy
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }
}

impl EntropySource for SeededEntropy {
    fn try_fill(&self, dest: &mut [u8]) -> CryptoResult<()> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| CryptoError::EntropyUnavailable("seeded rng poisoned".to_string()))?;
        rng.fill(dest);
        Ok(())
    }
}

/// Entropy source that always fails
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingEntropy;

impl EntropySource for FailingEntropy {
    fn try_fill(&self, _dest: &mut [u8]) -> CryptoResult<()> {
        Err(CryptoError::EntropyUnavailable("no entropy source in test".to_string()))
    }
}

/// Random source with the default seed
pub fn test_random() -> RandomSource {
    test_random_with_seed(DEFAULT_TEST_SEED)
}

/// Random source with a custom seed
pub fn test_random_with_seed(seed: u64) -> RandomSource {
    RandomSource::with_entropy(Arc::new(SeededEntropy::new(seed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_bytes() {
        assert_eq!(test_random().vec(48).unwrap(), test_random().vec(48).unwrap());
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = test_random_with_seed(1).array::<32>().unwrap();
        let b = test_random_with_seed(2).array::<32>().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sequence_advances() {
        let random = test_random();
        let first = random.array::<16>().unwrap();
        let second = random.array::<16>().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_failing_entropy_fails() {
        let mut buf = [0u8; 4];
        assert!(FailingEntropy.try_fill(&mut buf).is_err());
    }
}
