//! Tag normalization and content-derived identifiers.
//!
//! The id scheme is part of the destination contract: rows already keyed by
//! it must stay addressable, so the normalization and hash never change.

use sha1::{Digest, Sha1};

/// Prefix of synthesized tag ids.
pub const TAG_ID_PREFIX: &str = "tag_";

/// Hex characters of the digest kept in a tag id.
pub const TAG_ID_HEX_LEN: usize = 20;

/// Trims surrounding whitespace from a tag name.
#[must_use]
pub fn sanitize_tag_name(name: &str) -> &str {
    name.trim()
}

/// Trims and lowercases a tag name one character at a time.
///
/// Unlike `str::to_lowercase` there is no final-sigma context rule, and
/// `İ` (U+0130) folds to a plain `i`, so every stored id stays reproducible.
#[must_use]
pub fn normalize_tag_name(name: &str) -> String {
    name.trim()
        .chars()
        .flat_map(|c| {
            let folded = if c == '\u{130}' { 'i' } else { c };
            folded.to_lowercase()
        })
        .collect()
}

/// Dedup key of a tag: owner plus trimmed, lowercased name.
#[must_use]
pub fn tag_key(user_id: &str, name: &str) -> (String, String) {
    (user_id.to_string(), normalize_tag_name(name))
}

/// Deterministic tag id: `tag_` + the first 20 hex chars of
/// `sha1("{user_id}:{lower(trim(name))}")`.
#[must_use]
pub fn deterministic_tag_id(user_id: &str, name: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(normalize_tag_name(name).as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{TAG_ID_PREFIX}{}", &digest[..TAG_ID_HEX_LEN])
}

/// Id of the timeline entry at `index` in a link's embedded array.
#[must_use]
pub fn timeline_entry_id(link_id: &str, index: usize) -> String {
    format!("{link_id}_{index}")
}
