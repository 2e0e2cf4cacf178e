//! Text helpers shared by the job handlers: word counts, hashing, and prompt truncation.

use sha2::{Digest, Sha256};

/// Marker appended by [`truncate_for_prompt`] when text was shortened
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated]";

/// Count whitespace-delimited words.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Compute SHA-256 of the UTF-8 bytes of `text`, returning a lowercase hex string.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Shorten `text` to at most `max_chars` characters for an LLM prompt.
///
/// Cuts at the last whitespace at or before the limit so words are not split, falling
/// back to a hard cut when the prefix has no whitespace. Only for prompts; persisted
/// content is never truncated.
pub fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    // Includes the character at the limit so a boundary exactly there counts
    let window_end = text[cut..]
        .chars()
        .next()
        .map(|c| cut + c.len_utf8())
        .unwrap_or(cut);
    let window = &text[..window_end];

    let end = window
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(idx, _)| idx)
        .unwrap_or(cut);

    let mut truncated = text[..end].trim_end().to_string();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
