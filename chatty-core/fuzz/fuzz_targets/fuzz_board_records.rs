#![no_main]

use chatty_core::core_board::records::join_requests_path;
use chatty_core::core_board::BoardEvent;
use chatty_core::core_crypto::InviteKeyPair;
use chatty_core::core_invite::{resolve, IncomingRequest};
use chatty_core::core_vault::{GroupId, PendingInvite};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) else {
        return;
    };

    let group_id = GroupId::new("fuzz-group");
    let _ = IncomingRequest::from_entry(&group_id, "m000000000001", value.clone());
    let _ = IncomingRequest::from_event(&BoardEvent {
        path: format!("{}/m000000000002", join_requests_path(&group_id)),
        value: Some(value.clone()),
    });

    let keypair = InviteKeyPair::from_secret_bytes([1u8; 32]);
    let pending = PendingInvite::new("a1b2c3", group_id, &keypair);
    let _ = resolve(Some(&pending), "encryptedKeys/a1b2c3", Some(&value));
});
