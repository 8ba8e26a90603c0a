//! Error types for the invite exchange

use crate::core_board::BoardError;
use crate::core_crypto::CryptoError;
use crate::core_vault::{GroupId, VaultError};
use thiserror::Error;

/// Result type for invite operations
pub type InviteResult<T> = Result<T, InviteError>;

#[derive(Debug, Error)]
pub enum InviteError {
    /// Rejected locally, before any board access
    #[error("Invalid invite code: {0:?}")]
    InvalidInviteCode(String),

    /// Unknown, expired or already consumed by another joiner
    #[error("Invite not found: {0}")]
    InviteNotFound(String),

    #[error("Already a member of group {0}")]
    AlreadyMember(GroupId),

    #[error("Create or join a group first")]
    NoGroupSelected,

    #[error("Group not in vault: {0}")]
    UnknownGroup(GroupId),

    #[error("Join request for {0} was already answered")]
    AlreadyResponded(String),

    #[error("Malformed join request: {0}")]
    MalformedRequest(String),

    #[error("Malformed join response: {0}")]
    MalformedResponse(String),

    #[error("No pending invite for code {0}")]
    NotPending(String),

    /// Every generated code collided with a live invite
    #[error("No free invite code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Board(#[from] BoardError),
}
