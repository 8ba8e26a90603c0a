#![no_main]

use chatty_core::core_crypto::{GroupCipher, GroupIv, GroupKey};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let key = GroupKey::from_bytes([7u8; 32]);
    let iv = GroupIv::from_bytes([9u8; 16]);

    // Arbitrary board content must fail cleanly, never panic
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = GroupCipher::decrypt(text, &key, &iv);
        let _ = GroupCipher::decrypt_with_prefixed_iv(text, &key);
    }
});
