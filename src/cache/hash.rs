//! Query fingerprints.
//!
//! A fingerprint is the SHA-256 of a query's canonical JSON behind a format
//! tag. Bump the tag whenever the canonical encoding changes.

use sha2::{Digest, Sha256};

const FORMAT_TAG: &[u8] = b"phenoquery/spec/v1\0";

/// Hex fingerprint of canonical spec bytes; 64 lowercase characters.
pub fn spec_fingerprint(canonical: &[u8]) -> String {
    let digest = Sha256::new()
        .chain_update(FORMAT_TAG)
        .chain_update(canonical)
        .finalize();
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}
