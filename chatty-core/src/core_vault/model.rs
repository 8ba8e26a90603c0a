//! Vault data model
//!
//! The vault is one mapping `GroupId -> GroupRecord`, always serialized and
//! encrypted as a whole.

use crate::core_crypto::{CryptoResult, GroupIv, GroupKey, RandomSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name given to a group created without one
pub const DEFAULT_GROUP_NAME: &str = "No Name";

/// Opaque group identifier (a UUID string when generated locally)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Fresh random identifier
    pub fn generate(random: &RandomSource) -> CryptoResult<Self> {
        Ok(Self(random.uuid()?.to_string()))
    }

    /// Identifier received from another member
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-device identifier, used as the author of outgoing messages
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn generate(random: &RandomSource) -> CryptoResult<Self> {
        Ok(Self(hex::encode(random.array::<16>()?)))
    }

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything a device knows about one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id: GroupId,
    pub display_name: String,
    pub symmetric_key: GroupKey,
    pub iv: GroupIv,
}

impl GroupRecord {
    /// Build a record; a blank name becomes [`DEFAULT_GROUP_NAME`]
    pub fn new(group_id: GroupId, display_name: &str, symmetric_key: GroupKey, iv: GroupIv) -> Self {
        let trimmed = display_name.trim();
        let display_name = if trimmed.is_empty() {
            DEFAULT_GROUP_NAME.to_string()
        } else {
            trimmed.to_string()
        };
        Self { group_id, display_name, symmetric_key, iv }
    }

    /// New group with fresh key material
    pub fn generate(display_name: &str, random: &RandomSource) -> CryptoResult<Self> {
        Ok(Self::new(
            GroupId::generate(random)?,
            display_name,
            random.group_key()?,
            random.group_iv()?,
        ))
    }
}

/// The decrypted group mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    groups: BTreeMap<GroupId, GroupRecord>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &GroupId) -> Option<&GroupRecord> {
        self.groups.get(id)
    }

    pub fn contains(&self, id: &GroupId) -> bool {
        self.groups.contains_key(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupRecord> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// In-memory insert; persistence goes through `VaultSession::upsert`
    pub(crate) fn insert(&mut self, record: GroupRecord) -> Option<GroupRecord> {
        self.groups.insert(record.group_id.clone(), record)
    }
}
