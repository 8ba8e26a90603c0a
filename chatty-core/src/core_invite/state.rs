//! Per-code invite state
//!
//! ```text
//! publisher:  Issued -> Consumed
//! requester:  Pending -> Accepted -> Consumed
//!             Pending -> Rejected
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InviteState {
    /// Code published, no request seen yet
    Issued,
    /// Join request sent, response not yet resolved
    Pending,
    /// Response carried the group key
    Accepted,
    /// Response was a rejection; terminal
    Rejected,
    /// Code used up; terminal
    Consumed,
}

impl InviteState {
    pub fn can_transition_to(self, next: InviteState) -> bool {
        use InviteState::*;
        matches!(
            (self, next),
            (Issued, Consumed) | (Pending, Accepted) | (Pending, Rejected) | (Accepted, Consumed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InviteState::Rejected | InviteState::Consumed)
    }
}
