//! Session context
//!
//! Holds what the UI would otherwise keep as globals: this device's id, the
//! currently selected group and the message IV policy. It is passed
//! explicitly to every operation that needs it.

use crate::core_board::BoardError;
use crate::core_crypto::{CryptoError, RandomSource};
use crate::core_vault::{DeviceId, GroupId, GroupRecord, VaultError, VaultSession};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

pub mod feed;

pub use feed::{compose, open_record, read_feed, send_message, FeedItem};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Create or join a group first")]
    NoGroupSelected,

    #[error("Group not in vault: {0}")]
    UnknownGroup(GroupId),

    #[error("Message is empty")]
    EmptyMessage,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Board(#[from] BoardError),
}

/// How message IVs are chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IvPolicy {
    /// Every message in a group uses the group's stored IV
    #[default]
    GroupStatic,
    /// Each message gets a fresh IV, sent as `base64(iv || ciphertext)`
    PerMessage,
}

impl fmt::Display for IvPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IvPolicy::GroupStatic => f.write_str("group_static"),
            IvPolicy::PerMessage => f.write_str("per_message"),
        }
    }
}

impl FromStr for IvPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "group_static" => Ok(IvPolicy::GroupStatic),
            "per_message" => Ok(IvPolicy::PerMessage),
            other => Err(format!("unknown IV policy {:?}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    device_id: DeviceId,
    selected: Option<GroupId>,
    iv_policy: IvPolicy,
}

impl Session {
    pub fn new(device_id: DeviceId, iv_policy: IvPolicy) -> Self {
        Self {
            device_id,
            selected: None,
            iv_policy,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn iv_policy(&self) -> IvPolicy {
        self.iv_policy
    }

    pub fn selected_group(&self) -> Option<&GroupId> {
        self.selected.as_ref()
    }

    /// Switch to a group the vault knows about
    pub fn select(&mut self, vault: &VaultSession, group_id: &GroupId) -> SessionResult<()> {
        if vault.group(group_id)?.is_none() {
            return Err(SessionError::UnknownGroup(group_id.clone()));
        }
        self.selected = Some(group_id.clone());
        Ok(())
    }

    /// The selected group's record
    pub fn current_group<'v>(&self, vault: &'v VaultSession) -> SessionResult<&'v GroupRecord> {
        let id = self.selected.as_ref().ok_or(SessionError::NoGroupSelected)?;
        vault.group(id)?.ok_or_else(|| SessionError::UnknownGroup(id.clone()))
    }

    /// Create a group with fresh key material, store it and select it
    ///
    /// Purely local: nothing is published.
    pub fn create_group(
        &mut self,
        vault: &mut VaultSession,
        name: &str,
        random: &RandomSource,
    ) -> SessionResult<GroupRecord> {
        let record = GroupRecord::generate(name, random)?;
        vault.upsert(record.clone())?;
        self.selected = Some(record.group_id.clone());
        info!(group_id = %record.group_id, "Group created");
        Ok(record)
    }
}
