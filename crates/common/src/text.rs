//! Helpers for clipping command output before it is logged or returned.

/// Marker appended to output that was cut at the byte limit.
pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

/// Truncate `s` to at most `max_bytes`, backing off to the previous char
/// boundary, and append [`TRUNCATION_MARKER`] when anything was removed.
pub fn truncate_utf8(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut cut = max_bytes;
    while cut > 0 && !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    s.push_str(TRUNCATION_MARKER);
}

/// Borrow at most the first `max_chars` characters of `s` for a log line.
pub fn preview(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
