//! SHA256 helpers, including the BIP340-style tagged hash construction
//! used for event identifiers.

use sha2::Digest as _;

/// Tag for event identifiers.
pub(crate) const TAG_EVENT_ID: &str = "DLC/event_id";

/// Compute the SHA256 hash of some input data.
pub fn sha256(input: &[u8]) -> [u8; 32] {
    sha2::Sha256::new().chain_update(input).finalize().into()
}

/// Returns a SHA256 engine pre-loaded with `SHA256(tag) || SHA256(tag)`.
pub(crate) fn tagged_hasher(tag: &str) -> sha2::Sha256 {
    let tag_hash = sha256(tag.as_bytes());
    sha2::Sha256::new()
        .chain_update(tag_hash)
        .chain_update(tag_hash)
}

/// Compute `SHA256(SHA256(tag) || SHA256(tag) || chunks...)`.
pub fn tagged_hash<'a>(tag: &str, chunks: impl IntoIterator<Item = &'a [u8]>) -> [u8; 32] {
    let mut hasher = tagged_hasher(tag);
    for chunk in chunks {
        hasher.update(chunk);
    }
    hasher.finalize().into()
}
