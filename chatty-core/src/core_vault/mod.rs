//! Local credential vault
//!
//! Group keys live in one password-encrypted blob. The password itself is
//! stored only as an Argon2id hash. Pending join requests are kept alongside
//! in a separate, unencrypted file.

pub mod blob;
pub mod errors;
pub mod model;
pub mod password;
pub mod pending;
pub mod vault;

pub use errors::{VaultError, VaultResult};
pub use model::{DeviceId, GroupId, GroupRecord, Vault, DEFAULT_GROUP_NAME};
pub use password::KdfParams;
pub use pending::{PendingInvite, PendingStore};
pub use vault::{LocalVault, VaultSession};
