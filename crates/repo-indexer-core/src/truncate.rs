//! Boundary-aware content truncation.
//!
//! Chunk content is bounded per entity type before it is embedded. The
//! cut prefers the end of a block (`\n}`), the end of a statement (`;`
//! followed by a newline) or a line break, as long as that boundary keeps
//! at least half of the budget. Otherwise the text is hard-cut at the
//! budget.
//!
//! The marker is appended after the cut, so a truncated result is at most
//! `max_len + TRUNCATION_MARKER.len()` bytes. Truncating it again is a
//! no-op.

/// Appended to every truncated text.
pub const TRUNCATION_MARKER: &str = "\n... [truncated]";

/// Truncate `text` to at most `max_len` bytes at a structural boundary,
/// then append [`TRUNCATION_MARKER`].
///
/// Returns `text` unchanged when it already fits.
pub fn truncate_at_boundary(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }

    let mut cut = max_len;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    let window = &text[..cut];

    let boundary = [
        window.rfind("\n}").map(|i| i + 2),
        window.rfind(";\n").map(|i| i + 1),
        window.rfind('\n'),
    ]
    .into_iter()
    .flatten()
    .max();

    let end = match boundary {
        Some(b) if b * 2 >= max_len => b,
        _ => cut,
    };

    let mut out = String::with_capacity(end + TRUNCATION_MARKER.len());
    out.push_str(&text[..end]);
    out.push_str(TRUNCATION_MARKER);
    out
}
