//! Revision tokens
//!
//! A revision is `<generation>-<hash>`: the generation counts writes to the
//! key (tombstones included) and the hash is the leading 16 bytes of
//! SHA-256 over the previous revision, the deleted flag and the body.

use sha2::{Digest, Sha256};

/// Generation number of a revision token, if well-formed
pub fn generation(rev: &str) -> Option<u64> {
    let (generation, hash) = rev.split_once('-')?;
    if hash.is_empty() {
        return None;
    }
    generation.parse().ok()
}

/// Stamp the revision that follows `previous`.
pub fn next_revision(previous: Option<&str>, deleted: bool, body: &[u8]) -> String {
    let next_generation = previous.and_then(generation).unwrap_or(0) + 1;

    let mut hasher = Sha256::new();
    hasher.update(previous.unwrap_or("").as_bytes());
    hasher.update([deleted as u8]);
    hasher.update(body);
    let digest = format!("{:x}", hasher.finalize());

    format!("{}-{}", next_generation, &digest[..32])
}
