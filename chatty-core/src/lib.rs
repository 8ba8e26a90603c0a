//! chatty-core: key exchange and local credential vault for peer-invited,
//! end-to-end encrypted group chat.
//!
//! - [`core_crypto`] - secure randomness, the per-message group cipher and
//!   asymmetric wrapping of group keys
//! - [`core_vault`] - the password-protected store of group keys
//! - [`core_board`] - the bulletin-board collaborator used as transport
//! - [`core_invite`] - invite codes and the join handshake
//! - [`core_session`] - the explicit session context and message feed

pub mod config;
pub mod core_board;
pub mod core_crypto;
pub mod core_invite;
pub mod core_session;
pub mod core_vault;
pub mod logging;
pub mod metrics;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::Config;
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
