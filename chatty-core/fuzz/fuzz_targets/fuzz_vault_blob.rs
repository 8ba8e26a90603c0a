#![no_main]

use chatty_core::core_vault::blob::{open, BlobHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = BlobHeader::parse(data) {
        // Keep the KDF cheap; parameters come straight from the input
        if header.kdf.memory_kib <= 256 && header.kdf.iterations <= 2 {
            let _ = open(data, "fuzz_passphrase");
        }
    }
});
