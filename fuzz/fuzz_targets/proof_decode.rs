//! Fuzz target for DPoP proof decoding
//!
//! Decoding must never panic on malformed input.

#![no_main]

use arbitrary::Arbitrary;
use dpop_client::crypto::decode_proof;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzProofInput {
    proof: String,
}

fuzz_target!(|input: FuzzProofInput| {
    if let Ok(decoded) = decode_proof(&input.proof) {
        // Anything that decodes must render and start the signed string
        let _ = decoded.to_string();
        assert!(input.proof.starts_with(&decoded.signing_input));
        let _ = decoded.header.jwk.to_verifying_key();
    }
});
