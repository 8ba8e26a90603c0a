//! Invite codes
//!
//! Six lowercase hex characters drawn from three CSPRNG bytes. Codes are
//! short enough to read aloud; they are single-use and consumed on first
//! join, and are not meant to resist guessing on their own.

use super::errors::{InviteError, InviteResult};
use crate::core_crypto::{CryptoResult, RandomSource};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of characters in an invite code
pub const INVITE_CODE_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    pub fn generate(random: &RandomSource) -> CryptoResult<Self> {
        Ok(Self(hex::encode(random.array::<{ INVITE_CODE_LEN / 2 }>()?)))
    }

    /// Validate user input; surrounding whitespace and case are ignored
    pub fn parse(input: &str) -> InviteResult<Self> {
        let code = input.trim().to_ascii_lowercase();
        if code.len() != INVITE_CODE_LEN || !code.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(InviteError::InvalidInviteCode(input.to_string()));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_random;
    use proptest::prelude::*;

    #[test]
    fn test_generated_codes_are_valid() {
        let random = test_random();
        for _ in 0..50 {
            let code = InviteCode::generate(&random).unwrap();
            assert_eq!(code.as_str().len(), INVITE_CODE_LEN);
            assert_eq!(InviteCode::parse(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn test_parse_normalizes() {
        assert_eq!(InviteCode::parse(" A1B2C3\n").unwrap().as_str(), "a1b2c3");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "a1b2c", "a1b2c3d", "a1b2cg", "a1 2c3", "ä1b2c3"] {
            assert!(
                matches!(InviteCode::parse(bad), Err(InviteError::InvalidInviteCode(_))),
                "accepted {:?}",
                bad
            );
        }
    }

    proptest! {
        #[test]
        fn prop_parse_accepts_exactly_six_hex(s in "[0-9a-fA-F]{6}") {
            prop_assert!(InviteCode::parse(&s).is_ok());
        }

        #[test]
        fn prop_parse_rejects_other_lengths(s in "[0-9a-f]{0,5}|[0-9a-f]{7,12}") {
            prop_assert!(InviteCode::parse(&s).is_err());
        }
    }
}
