//! Display-width text helpers.
//!
//! Widths count `char`s, not bytes: the target screen renders one glyph per
//! column from a fixed-pitch font.

/// Truncate `text` to at most `width` characters.
pub fn truncate(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// Split `text` into consecutive chunks of at most `width` characters.
///
/// Empty input yields no chunks. A zero width yields the text unsplit.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if width == 0 {
        return vec![text.to_string()];
    }

    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(width)
        .map(|chunk| chunk.iter().collect())
        .collect()
}
