//! Test fixtures
//!
//! A [`TestDevice`] is one simulated chatty install: its own temp directory,
//! an unlocked vault, a session and an invite exchange, attached to a board
//! that may be shared with other devices.

use crate::config::{InviteConfig, VaultConfig};
use crate::core_board::MemoryBoard;
use crate::core_crypto::RandomSource;
use crate::core_invite::InviteExchange;
use crate::core_session::{IvPolicy, Session};
use crate::core_vault::{KdfParams, LocalVault, PendingStore, VaultSession};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Password used by every fixture vault
pub const TEST_PASSWORD: &str = "correct horse battery";

/// Cheapest Argon2id parameters the crate accepts
pub fn fast_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    }
}

/// Vault configuration rooted at `dir` with the fast KDF
pub fn test_vault_config(dir: &Path) -> VaultConfig {
    VaultConfig {
        data_dir: dir.to_path_buf(),
        min_password_len: 8,
        kdf: fast_kdf(),
    }
}

pub struct TestDevice {
    pub name: String,
    pub dir: TempDir,
    pub board: MemoryBoard,
    pub random: RandomSource,
    pub store: LocalVault,
    pub vault: VaultSession,
    pub session: Session,
    pub exchange: InviteExchange,
}

impl TestDevice {
    /// Device on its own private board
    pub fn new(name: &str) -> Self {
        Self::on_board(name, &MemoryBoard::new())
    }

    /// Device attached to a shared board
    pub fn on_board(name: &str, board: &MemoryBoard) -> Self {
        Self::with_policy(name, board, IvPolicy::GroupStatic)
    }

    pub fn with_policy(name: &str, board: &MemoryBoard, policy: IvPolicy) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let random = RandomSource::os();
        let store = LocalVault::open(&test_vault_config(dir.path()), random.clone()).expect("vault dir");
        let vault = store.open_session(TEST_PASSWORD).expect("unlock");
        let session = Session::new(store.device_id().expect("device id"), policy);
        let exchange = Self::exchange_for(dir.path(), board, &random);
        Self {
            name: name.to_string(),
            dir,
            board: board.clone(),
            random,
            store,
            vault,
            session,
            exchange,
        }
    }

    fn exchange_for(dir: &Path, board: &MemoryBoard, random: &RandomSource) -> InviteExchange {
        InviteExchange::new(
            Arc::new(board.clone()),
            PendingStore::open(dir).expect("pending store"),
            random.clone(),
            InviteConfig::default(),
        )
    }

    /// Simulate a restart: fresh vault session and exchange over the same files
    pub fn restart(&mut self) {
        self.vault = self.store.open_session(TEST_PASSWORD).expect("unlock");
        self.exchange = Self::exchange_for(self.dir.path(), &self.board, &self.random);
        let device_id = self.store.device_id().expect("device id");
        self.session = Session::new(device_id, self.session.iv_policy());
    }

    /// Create and select a group
    pub fn create_group(&mut self, name: &str) -> crate::core_vault::GroupRecord {
        let random = self.random.clone();
        self.session
            .create_group(&mut self.vault, name, &random)
            .expect("create group")
    }
}
