//! Password-protected local vault
//!
//! Files under the data directory:
//! - `password.hash` - Argon2id PHC string, written once on first unlock
//! - `groups.vault` - the encrypted group mapping (see [`super::blob`])
//! - `device.id` - this device's random identifier
//!
//! `unlock` authenticates and returns a [`VaultSession`], which holds the
//! password for its lifetime. `load` decrypts the stored blob into the
//! session. Until a session is loaded it refuses to write, so an
//! authenticated but unloaded session can never overwrite stored groups
//! with an empty mapping.

use super::blob;
use super::errors::{VaultError, VaultResult};
use super::model::{DeviceId, GroupId, GroupRecord, Vault};
use super::password::{hash_password, verify_password, KdfParams};
use crate::config::VaultConfig;
use crate::core_crypto::RandomSource;
use crate::metrics;
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const PASSWORD_HASH_FILE: &str = "password.hash";
const VAULT_FILE: &str = "groups.vault";
const DEVICE_ID_FILE: &str = "device.id";

/// Write file atomically (write to temp, then rename)
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> VaultResult<()> {
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// On-disk location and policy of a vault
#[derive(Debug, Clone)]
pub struct LocalVault {
    dir: PathBuf,
    kdf: KdfParams,
    min_password_len: usize,
    random: RandomSource,
}

impl LocalVault {
    /// Open (creating the directory if needed) without touching any secrets
    pub fn open(config: &VaultConfig, random: RandomSource) -> VaultResult<Self> {
        fs::create_dir_all(&config.data_dir)?;
        Ok(Self {
            dir: config.data_dir.clone(),
            kdf: config.kdf,
            min_password_len: config.min_password_len,
            random,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn hash_path(&self) -> PathBuf {
        self.dir.join(PASSWORD_HASH_FILE)
    }

    fn blob_path(&self) -> PathBuf {
        self.dir.join(VAULT_FILE)
    }

    /// Whether a password has been set on this device
    pub fn is_initialized(&self) -> bool {
        self.hash_path().exists()
    }

    /// Authenticate with `password`
    ///
    /// First run: the password is checked against the minimum length,
    /// hashed and stored, and the session starts loaded with an empty vault.
    /// Later runs: the password is verified against the stored hash and the
    /// session starts unloaded. A mismatch is [`VaultError::AuthFailure`].
    /// Vault data without a hash is treated as corruption, never as a first run.
    pub fn unlock(&self, password: &str) -> VaultResult<VaultSession> {
        let timer = metrics::Timer::new(metrics::VAULT_UNLOCK_DURATION);
        let hash_path = self.hash_path();

        let session = if hash_path.exists() {
            let stored = fs::read_to_string(&hash_path)?;
            if !verify_password(password, &stored)? {
                warn!(dir = %self.dir.display(), "Vault unlock failed");
                return Err(VaultError::AuthFailure);
            }
            info!(dir = %self.dir.display(), "Vault unlocked");
            VaultSession::new(self.clone(), password, None)
        } else {
            if self.blob_path().exists() {
                warn!(dir = %self.dir.display(), "Vault data present without a password hash");
                return Err(VaultError::Decryption(
                    "password hash is missing for existing vault data".to_string(),
                ));
            }
            if password.chars().count() < self.min_password_len {
                return Err(VaultError::WeakPassword { min: self.min_password_len });
            }
            let hash = hash_password(password, &self.kdf, &self.random)?;
            write_atomic(&hash_path, hash.as_bytes())?;
            info!(dir = %self.dir.display(), "Vault created");
            VaultSession::new(self.clone(), password, Some(Vault::new()))
        };

        timer.stop();
        Ok(session)
    }

    /// `unlock` followed by `load`
    pub fn open_session(&self, password: &str) -> VaultResult<VaultSession> {
        let mut session = self.unlock(password)?;
        session.load()?;
        Ok(session)
    }

    /// This device's id, generated and persisted on first use
    pub fn device_id(&self) -> VaultResult<DeviceId> {
        let path = self.dir.join(DEVICE_ID_FILE);
        if path.exists() {
            let id = fs::read_to_string(&path)?;
            let id = id.trim();
            if !id.is_empty() {
                return Ok(DeviceId::new(id));
            }
        }
        let id = DeviceId::generate(&self.random)?;
        write_atomic(&path, id.as_str().as_bytes())?;
        debug!(device_id = %id, "Generated device id");
        Ok(id)
    }
}

/// An authenticated vault, holding the password until dropped
pub struct VaultSession {
    store: LocalVault,
    password: SecretString,
    vault: Option<Vault>,
}

impl VaultSession {
    fn new(store: LocalVault, password: &str, vault: Option<Vault>) -> Self {
        Self {
            store,
            password: SecretString::new(password.to_string()),
            vault,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.vault.is_some()
    }

    /// Decrypt the stored blob into the session
    ///
    /// A missing blob yields an empty vault. A blob that fails to decrypt or
    /// parse is [`VaultError::Decryption`] and nothing is loaded.
    pub fn load(&mut self) -> VaultResult<&Vault> {
        let path = self.store.blob_path();
        let vault = if path.exists() {
            let data = fs::read(&path)?;
            let plaintext = blob::open(&data, self.password.expose_secret())?;
            serde_json::from_slice::<Vault>(&plaintext)
                .map_err(|e| VaultError::Decryption(format!("Malformed vault contents: {}", e)))?
        } else {
            Vault::new()
        };
        debug!(groups = vault.len(), "Vault loaded");
        let loaded: &Vault = self.vault.insert(vault);
        Ok(loaded)
    }

    /// The loaded mapping
    pub fn vault(&self) -> VaultResult<&Vault> {
        self.vault.as_ref().ok_or(VaultError::NotLoaded)
    }

    pub fn group(&self, id: &GroupId) -> VaultResult<Option<&GroupRecord>> {
        Ok(self.vault()?.get(id))
    }

    /// Re-encrypt the whole mapping and replace the stored blob atomically
    pub fn save(&self) -> VaultResult<()> {
        self.persist(self.vault()?)
    }

    fn persist(&self, vault: &Vault) -> VaultResult<()> {
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(vault)?);
        let sealed = blob::seal(
            &plaintext,
            self.password.expose_secret(),
            &self.store.kdf,
            &self.store.random,
        )?;
        write_atomic(&self.store.blob_path(), &sealed)?;
        metrics::record_vault_save();
        debug!(groups = vault.len(), "Vault saved");
        Ok(())
    }

    /// Insert or replace a group record, then save
    ///
    /// The in-memory mapping only changes once the new blob is on disk.
    pub fn upsert(&mut self, record: GroupRecord) -> VaultResult<()> {
        let mut next = self.vault()?.clone();
        let group_id = record.group_id.clone();
        next.insert(record);
        self.persist(&next)?;
        self.vault = Some(next);
        info!(group_id = %group_id, "Group stored");
        Ok(())
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("dir", &self.store.dir)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_random, test_vault_config};
    use tempfile::TempDir;

    fn local_vault(dir: &TempDir) -> LocalVault {
        LocalVault::open(&test_vault_config(dir.path()), test_random()).unwrap()
    }

    #[test]
    fn test_first_unlock_creates_empty_loaded_vault() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        assert!(!store.is_initialized());

        let session = store.unlock("password123").unwrap();
        assert!(store.is_initialized());
        assert!(session.is_loaded());
        assert!(session.vault().unwrap().is_empty());
        assert!(!dir.path().join(VAULT_FILE).exists());
    }

    #[test]
    fn test_short_password_refused_on_creation() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        assert!(matches!(store.unlock("short"), Err(VaultError::WeakPassword { min: 8 })));
        assert!(!store.is_initialized());
    }

    #[test]
    fn test_wrong_password_never_yields_vault() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let mut session = store.unlock("password123").unwrap();
        session.upsert(GroupRecord::generate("Friends", &test_random()).unwrap()).unwrap();

        assert!(matches!(store.unlock("password124"), Err(VaultError::AuthFailure)));
        assert!(matches!(store.open_session("password124"), Err(VaultError::AuthFailure)));
    }

    #[test]
    fn test_save_then_load_returns_same_mapping() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let random = test_random();

        let mut session = store.unlock("password123").unwrap();
        session.upsert(GroupRecord::generate("one", &random).unwrap()).unwrap();
        session.upsert(GroupRecord::generate("two", &random).unwrap()).unwrap();
        let expected = session.vault().unwrap().clone();
        drop(session);

        let reopened = store.open_session("password123").unwrap();
        assert_eq!(reopened.vault().unwrap(), &expected);
    }

    #[test]
    fn test_unloaded_session_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let mut first = store.unlock("password123").unwrap();
        first.upsert(GroupRecord::generate("kept", &test_random()).unwrap()).unwrap();

        let mut second = store.unlock("password123").unwrap();
        assert!(!second.is_loaded());
        assert!(matches!(second.vault(), Err(VaultError::NotLoaded)));
        assert!(matches!(second.save(), Err(VaultError::NotLoaded)));
        assert!(matches!(
            second.upsert(GroupRecord::generate("x", &test_random()).unwrap()),
            Err(VaultError::NotLoaded)
        ));

        assert_eq!(second.load().unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_blob_is_decryption_error() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let mut session = store.unlock("password123").unwrap();
        session.upsert(GroupRecord::generate("g", &test_random()).unwrap()).unwrap();

        let path = dir.path().join(VAULT_FILE);
        let mut data = fs::read(&path).unwrap();
        let len = data.len();
        data[len - 5] ^= 0x10;
        fs::write(&path, &data).unwrap();

        let mut session = store.unlock("password123").unwrap();
        assert!(matches!(session.load(), Err(VaultError::Decryption(_))));
        assert!(!session.is_loaded());
    }

    #[test]
    fn test_upsert_replaces_record() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let random = test_random();
        let mut session = store.unlock("password123").unwrap();

        let record = GroupRecord::generate("before", &random).unwrap();
        session.upsert(record.clone()).unwrap();
        let mut renamed = record.clone();
        renamed.display_name = "after".to_string();
        session.upsert(renamed).unwrap();

        let reopened = store.open_session("password123").unwrap();
        assert_eq!(reopened.vault().unwrap().len(), 1);
        assert_eq!(
            reopened.group(&record.group_id).unwrap().unwrap().display_name,
            "after"
        );
    }

    #[test]
    fn test_device_id_is_stable() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let first = store.device_id().unwrap();
        let second = local_vault(&dir).device_id().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let mut session = store.unlock("password123").unwrap();
        session.upsert(GroupRecord::generate("g", &test_random()).unwrap()).unwrap();
        assert!(!dir.path().join("groups.tmp").exists());
        assert!(dir.path().join(VAULT_FILE).exists());
    }

    #[test]
    fn test_lost_hash_does_not_reset_vault() {
        let dir = TempDir::new().unwrap();
        let store = local_vault(&dir);
        let mut session = store.unlock("password123").unwrap();
        session.upsert(GroupRecord::generate("kept", &test_random()).unwrap()).unwrap();
        drop(session);

        let blob_before = fs::read(dir.path().join(VAULT_FILE)).unwrap();
        fs::remove_file(dir.path().join(PASSWORD_HASH_FILE)).unwrap();

        assert!(matches!(store.unlock("another password"), Err(VaultError::Decryption(_))));
        assert!(matches!(store.unlock("password123"), Err(VaultError::Decryption(_))));
        assert!(!store.is_initialized());
        assert_eq!(fs::read(dir.path().join(VAULT_FILE)).unwrap(), blob_before);
    }
}
