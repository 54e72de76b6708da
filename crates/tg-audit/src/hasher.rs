// hasher.rs - SHA-256 helpers for the audit hash chain.

use sha2::{Digest, Sha256};

/// Hash a UTF-8 string, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_str(s: &str) -> String {
    format!("{:x}", Sha256::digest(s.as_bytes()))
}
