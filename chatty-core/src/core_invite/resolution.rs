//! Resolving an observed join response
//!
//! [`resolve`] is a pure function of the latest observed record and the
//! current pending entry. It touches neither the vault nor the board, so it
//! can run while no vault mutation is in flight and be retried freely. The
//! presence of the pending entry is the only gate: once it has been removed,
//! every later delivery of the same response resolves to [`Resolution::Ignore`].

use super::errors::{InviteError, InviteResult};
use crate::core_board::records::{from_value, KeyResponse, KeyResponseRecord};
use crate::core_crypto::unwrap_group_key;
use crate::core_vault::{GroupId, GroupRecord, PendingInvite};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing to do: not pending any more, or no response yet
    Ignore,
    /// The group key was unwrapped into a record ready to store
    Accept(GroupRecord),
    /// The request was turned down
    Reject { group_id: GroupId, group_name: String },
}

/// Decide what an observed `encryptedKeys/{code}` value means for `pending`
pub fn resolve(
    pending: Option<&PendingInvite>,
    path: &str,
    observed: Option<&Value>,
) -> InviteResult<Resolution> {
    let (pending, value) = match (pending, observed) {
        (Some(pending), Some(value)) => (pending, value),
        _ => return Ok(Resolution::Ignore),
    };

    let record: KeyResponseRecord = from_value(path, value.clone())?;
    let response = KeyResponse::from_record(record).map_err(InviteError::MalformedResponse)?;

    if response.group_id() != &pending.group_id {
        return Err(InviteError::MalformedResponse(format!(
            "response names group {} but the invite was for {}",
            response.group_id(),
            pending.group_id
        )));
    }

    match response {
        KeyResponse::Rejected { group_id, group_name } => Ok(Resolution::Reject { group_id, group_name }),
        KeyResponse::Accepted { wrapped, group_name, group_id } => {
            let keypair = pending.keypair()?;
            let (key, iv) = unwrap_group_key(&keypair, &wrapped, pending.invite_code.as_bytes())?;
            Ok(Resolution::Accept(GroupRecord::new(group_id, &group_name, key, iv)))
        }
    }
}
