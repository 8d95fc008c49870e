//! Text normalization and content-hash keys
//!
//! Identical normalized text must always map to the same cache/DLQ key, so
//! both the cache and the dead letter store key on the SHA-256 of the
//! normalized form.

use sha2::{Digest, Sha256};

/// Collapse whitespace runs to single spaces and truncate to `max_chars`
/// characters.
pub fn normalize(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        collapsed.chars().take(max_chars).collect()
    }
}

/// Content-hash key of already-normalized text: lowercase SHA-256 hex.
pub fn content_key(normalized: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Short key prefix used in log lines
pub fn key_prefix(key: &str) -> &str {
    &key[..key.len().min(16)]
}
