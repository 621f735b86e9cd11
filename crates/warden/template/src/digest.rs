//! Content digests

use sha2::{Digest, Sha256};

pub const SHA256_PREFIX: &str = "sha256:";

/// `sha256:<hex>` digest of a payload
pub fn sha256_digest(bytes: &[u8]) -> String {
    format!("{SHA256_PREFIX}{}", hex::encode(Sha256::digest(bytes)))
}

/// Digest pinned in a `repo@sha256:...` reference, if any
pub fn digest_from_reference(reference: &str) -> Option<&str> {
    reference
        .rsplit_once('@')
        .map(|(_, digest)| digest)
        .filter(|digest| digest.starts_with(SHA256_PREFIX))
}
