//! Fuzz target for htu normalization

#![no_main]

use dpop_client::issuer::normalize_target;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|url: &str| {
    if let Ok(htu) = normalize_target(url) {
        assert!(!htu.contains('#'));
    }
});
