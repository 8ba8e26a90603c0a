//! Record shapes and paths on the board
//!
//! ```text
//! invites/{code}                      -> { groupId }
//! joinRequests/{groupId}/{messageId}  -> { content: "<publicKey>,<code>", author: "specialGroupRequest" }
//! encryptedKeys/{code}                -> { encryptedAES: <wrapped or "rej">, groupName, groupUuid }
//! messages/{groupId}/{messageId}      -> { content: <base64 ciphertext>, author: <deviceId> }
//! ```

use super::{BoardError, BoardResult};
use crate::core_crypto::WrapPublicKey;
use crate::core_vault::GroupId;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author value marking a channel record as a join request
pub const JOIN_REQUEST_AUTHOR: &str = "specialGroupRequest";

/// `encryptedAES` value of a rejected request
pub const REJECTION_MARKER: &str = "rej";

pub fn invite_path(code: &str) -> String {
    format!("invites/{}", code)
}

pub fn join_requests_path(group_id: &GroupId) -> String {
    format!("joinRequests/{}", group_id)
}

pub fn encrypted_keys_path(code: &str) -> String {
    format!("encryptedKeys/{}", code)
}

pub fn messages_path(group_id: &GroupId) -> String {
    format!("messages/{}", group_id)
}

/// Last path segment
pub fn leaf(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

pub fn to_value<T: Serialize>(path: &str, record: &T) -> BoardResult<Value> {
    serde_json::to_value(record).map_err(|e| BoardError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

pub fn from_value<T: DeserializeOwned>(path: &str, value: Value) -> BoardResult<T> {
    serde_json::from_value(value).map_err(|e| BoardError::Malformed {
        path: path.to_string(),
        reason: e.to_string(),
    })
}

/// `invites/{code}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRecord {
    pub group_id: GroupId,
}

/// Entry in a group's message or join-request channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub content: String,
    pub author: String,
}

impl ChannelRecord {
    pub fn is_join_request(&self) -> bool {
        self.author == JOIN_REQUEST_AUTHOR
    }
}

/// Decoded join request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub public_key: WrapPublicKey,
    pub invite_code: String,
}

impl JoinRequest {
    pub fn to_record(&self) -> ChannelRecord {
        ChannelRecord {
            content: format!("{},{}", self.public_key.to_base64(), self.invite_code),
            author: JOIN_REQUEST_AUTHOR.to_string(),
        }
    }

    /// Parse a channel record; the error names what was wrong
    pub fn from_record(record: &ChannelRecord) -> Result<Self, String> {
        if !record.is_join_request() {
            return Err(format!("author {:?} is not a join request", record.author));
        }
        let (key, code) = record
            .content
            .rsplit_once(',')
            .ok_or_else(|| "missing ',' separator".to_string())?;
        let public_key = WrapPublicKey::from_base64(key).map_err(|e| e.to_string())?;
        Ok(Self {
            public_key,
            invite_code: code.trim().to_string(),
        })
    }
}

/// `encryptedKeys/{code}` as stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyResponseRecord {
    #[serde(rename = "encryptedAES")]
    pub encrypted_aes: String,
    pub group_name: String,
    pub group_uuid: GroupId,
}

/// Decoded response to a join request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResponse {
    Accepted {
        wrapped: Vec<u8>,
        group_name: String,
        group_id: GroupId,
    },
    Rejected {
        group_name: String,
        group_id: GroupId,
    },
}

impl KeyResponse {
    pub fn group_id(&self) -> &GroupId {
        match self {
            KeyResponse::Accepted { group_id, .. } | KeyResponse::Rejected { group_id, .. } => group_id,
        }
    }

    pub fn to_record(&self) -> KeyResponseRecord {
        match self {
            KeyResponse::Accepted { wrapped, group_name, group_id } => KeyResponseRecord {
                encrypted_aes: STANDARD.encode(wrapped),
                group_name: group_name.clone(),
                group_uuid: group_id.clone(),
            },
            KeyResponse::Rejected { group_name, group_id } => KeyResponseRecord {
                encrypted_aes: REJECTION_MARKER.to_string(),
                group_name: group_name.clone(),
                group_uuid: group_id.clone(),
            },
        }
    }

    pub fn from_record(record: KeyResponseRecord) -> Result<Self, String> {
        if record.encrypted_aes == REJECTION_MARKER {
            return Ok(KeyResponse::Rejected {
                group_name: record.group_name,
                group_id: record.group_uuid,
            });
        }
        let wrapped = STANDARD
            .decode(record.encrypted_aes.trim())
            .map_err(|e| format!("wrapped key is not base64: {}", e))?;
        Ok(KeyResponse::Accepted {
            wrapped,
            group_name: record.group_name,
            group_id: record.group_uuid,
        })
    }
}
