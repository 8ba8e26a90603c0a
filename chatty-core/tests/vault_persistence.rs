/*
    vault_persistence.rs - Local vault across restarts

    Groups written by one session must come back byte-for-byte in the next,
    and nothing readable may reach the disk.
*/

use chatty_core::core_crypto::RandomSource;
use chatty_core::core_session::{IvPolicy, Session};
use chatty_core::core_vault::{LocalVault, VaultError};
use chatty_core::test_utils::{test_vault_config, TEST_PASSWORD};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_groups_survive_restart() {
    let temp = tempdir().unwrap();
    let random = RandomSource::os();

    let created = {
        let store = LocalVault::open(&test_vault_config(temp.path()), random.clone()).unwrap();
        let mut vault = store.unlock(TEST_PASSWORD).unwrap();
        let mut session = Session::new(store.device_id().unwrap(), IvPolicy::GroupStatic);
        let first = session.create_group(&mut vault, "Hiking", &random).unwrap();
        let second = session.create_group(&mut vault, "   ", &random).unwrap();
        assert_eq!(second.display_name, "No Name");
        vec![first, second]
    };

    let store = LocalVault::open(&test_vault_config(temp.path()), random.clone()).unwrap();
    let vault = store.open_session(TEST_PASSWORD).unwrap();
    let loaded = vault.vault().unwrap();
    assert_eq!(loaded.len(), 2);
    for group in &created {
        assert_eq!(loaded.get(&group.group_id), Some(group));
    }

    let on_disk = fs::read(temp.path().join("groups.vault")).unwrap();
    let as_text = String::from_utf8_lossy(&on_disk);
    assert!(!as_text.contains("Hiking"));
    assert!(!as_text.contains(created[0].group_id.as_str()));
}

#[test]
fn test_device_id_is_stable() {
    let temp = tempdir().unwrap();
    let store = LocalVault::open(&test_vault_config(temp.path()), RandomSource::os()).unwrap();
    let first = store.device_id().unwrap();

    let reopened = LocalVault::open(&test_vault_config(temp.path()), RandomSource::os()).unwrap();
    assert_eq!(reopened.device_id().unwrap(), first);
}

#[test]
fn test_wrong_password_leaves_vault_untouched() {
    let temp = tempdir().unwrap();
    let random = RandomSource::os();
    let store = LocalVault::open(&test_vault_config(temp.path()), random.clone()).unwrap();
    {
        let mut vault = store.unlock(TEST_PASSWORD).unwrap();
        let mut session = Session::new(store.device_id().unwrap(), IvPolicy::GroupStatic);
        session.create_group(&mut vault, "Hiking", &random).unwrap();
    }
    let before = fs::read(temp.path().join("groups.vault")).unwrap();

    assert!(matches!(store.unlock("not the password"), Err(VaultError::AuthFailure)));
    assert_eq!(fs::read(temp.path().join("groups.vault")).unwrap(), before);
    assert_eq!(store.open_session(TEST_PASSWORD).unwrap().vault().unwrap().len(), 1);
}

#[test]
fn test_tampered_blob_is_refused() {
    let temp = tempdir().unwrap();
    let random = RandomSource::os();
    let store = LocalVault::open(&test_vault_config(temp.path()), random.clone()).unwrap();
    {
        let mut vault = store.unlock(TEST_PASSWORD).unwrap();
        let mut session = Session::new(store.device_id().unwrap(), IvPolicy::GroupStatic);
        session.create_group(&mut vault, "Hiking", &random).unwrap();
    }

    let path = temp.path().join("groups.vault");
    let mut blob = fs::read(&path).unwrap();
    let last = blob.len() - 1;
    blob[last] ^= 0x01;
    fs::write(&path, blob).unwrap();

    let mut vault = store.unlock(TEST_PASSWORD).unwrap();
    assert!(matches!(vault.load(), Err(VaultError::Decryption(_))));
    assert!(!vault.is_loaded());
}

#[test]
fn test_short_first_password_is_refused() {
    let temp = tempdir().unwrap();
    let store = LocalVault::open(&test_vault_config(temp.path()), RandomSource::os()).unwrap();

    assert!(matches!(store.unlock("short"), Err(VaultError::WeakPassword { min: 8 })));
    assert!(!store.is_initialized());
}
