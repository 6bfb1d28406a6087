// hasher.rs — SHA-256 hashing utilities.
//
// All hashes in the provision log are SHA-256, lowercase hex (64 chars).

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Hash a JSON value in its compact serialization.
///
/// Object keys serialize in sorted order, so equal values hash equally no
/// matter how they were built.
pub fn hash_json(value: &serde_json::Value) -> String {
    hash_str(&value.to_string())
}
