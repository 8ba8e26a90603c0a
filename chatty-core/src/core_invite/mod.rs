//! Asymmetric invite protocol
//!
//! Codes, per-code state, pure response resolution and the exchange that
//! ties them to the vault and the bulletin board.

pub mod code;
pub mod errors;
pub mod exchange;
pub mod resolution;
pub mod state;

pub use code::{InviteCode, INVITE_CODE_LEN};
pub use errors::{InviteError, InviteResult};
pub use exchange::{Decision, IncomingRequest, InviteExchange, JoinOutcome};
pub use resolution::{resolve, Resolution};
pub use state::InviteState;
