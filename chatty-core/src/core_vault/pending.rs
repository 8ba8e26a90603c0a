//! Outstanding join requests
//!
//! Each entry holds the invite code and the ephemeral private key generated
//! for it. The file is plain JSON: it is protected by the device, not by the
//! vault password, so invites survive a restart before the vault is unlocked.

use super::errors::{VaultError, VaultResult};
use super::model::GroupId;
use super::vault::write_atomic;
use crate::core_crypto::InviteKeyPair;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const PENDING_FILE: &str = "pending_invites.json";

/// A join request awaiting its response
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInvite {
    pub invite_code: String,
    /// Group the code pointed at when the request was sent
    pub group_id: GroupId,
    private_key: String,
}

impl PendingInvite {
    pub fn new(invite_code: &str, group_id: GroupId, keypair: &InviteKeyPair) -> Self {
        Self {
            invite_code: invite_code.to_string(),
            group_id,
            private_key: STANDARD.encode(keypair.secret_bytes().as_slice()),
        }
    }

    /// Rebuild the ephemeral keypair
    pub fn keypair(&self) -> VaultResult<InviteKeyPair> {
        let bytes = Zeroizing::new(
            STANDARD
                .decode(&self.private_key)
                .map_err(|e| VaultError::Serialization(format!("pending key: {}", e)))?,
        );
        let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            VaultError::Serialization(format!("pending key has {} bytes", bytes.len()))
        })?;
        Ok(InviteKeyPair::from_secret_bytes(array))
    }
}

impl std::fmt::Debug for PendingInvite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingInvite")
            .field("invite_code", &self.invite_code)
            .field("group_id", &self.group_id)
            .finish_non_exhaustive()
    }
}

/// File-backed set of pending invites keyed by code
#[derive(Debug, Clone)]
pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    pub fn open(dir: &Path) -> VaultResult<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self { path: dir.join(PENDING_FILE) })
    }

    pub fn load_all(&self) -> VaultResult<BTreeMap<String, PendingInvite>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let data = fs::read(&self.path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    fn store_all(&self, pending: &BTreeMap<String, PendingInvite>) -> VaultResult<()> {
        let data = serde_json::to_vec_pretty(pending)?;
        write_atomic(&self.path, &data)
    }

    pub fn get(&self, code: &str) -> VaultResult<Option<PendingInvite>> {
        Ok(self.load_all()?.remove(code))
    }

    pub fn insert(&self, invite: PendingInvite) -> VaultResult<()> {
        let mut all = self.load_all()?;
        all.insert(invite.invite_code.clone(), invite);
        self.store_all(&all)
    }

    /// Remove an entry; returns whether it was present
    pub fn remove(&self, code: &str) -> VaultResult<bool> {
        let mut all = self.load_all()?;
        let existed = all.remove(code).is_some();
        if existed {
            self.store_all(&all)?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_random;
    use tempfile::TempDir;

    #[test]
    fn test_insert_get_remove() {
        let dir = TempDir::new().unwrap();
        let store = PendingStore::open(dir.path()).unwrap();
        let keypair = InviteKeyPair::generate(&test_random()).unwrap();

        store.insert(PendingInvite::new("a1b2c3", GroupId::new("g-1"), &keypair)).unwrap();
        let loaded = store.get("a1b2c3").unwrap().unwrap();
        assert_eq!(loaded.group_id, GroupId::new("g-1"));
        assert_eq!(loaded.keypair().unwrap().public_key(), keypair.public_key());

        assert!(store.remove("a1b2c3").unwrap());
        assert!(!store.remove("a1b2c3").unwrap());
        assert!(store.get("a1b2c3").unwrap().is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let random = test_random();
        {
            let store = PendingStore::open(dir.path()).unwrap();
            for code in ["aaaaaa", "bbbbbb"] {
                let keypair = InviteKeyPair::generate(&random).unwrap();
                store.insert(PendingInvite::new(code, GroupId::new("g"), &keypair)).unwrap();
            }
        }
        let store = PendingStore::open(dir.path()).unwrap();
        let all = store.load_all().unwrap();
        assert_eq!(all.keys().cloned().collect::<Vec<_>>(), vec!["aaaaaa", "bbbbbb"]);
    }

    #[test]
    fn test_debug_hides_private_key() {
        let keypair = InviteKeyPair::generate(&test_random()).unwrap();
        let invite = PendingInvite::new("a1b2c3", GroupId::new("g"), &keypair);
        let secret = STANDARD.encode(keypair.secret_bytes().as_slice());
        assert!(!format!("{:?}", invite).contains(&secret));
    }
}
