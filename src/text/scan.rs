//! Cursor-style scanning helpers over `&mut &str`.
//!
//! Each helper advances the borrowed slice in place, so callers thread one
//! cursor through a sequence of accepts without copying text.

/// Splits off the next line, including its terminating `\n` when present.
pub fn next_line<'t>(text: &mut &'t str) -> &'t str {
    let end = match text.find('\n') {
        Some(newline) => newline + 1,
        None => text.len(),
    };
    let (line, rest) = text.split_at(end);
    *text = rest;
    line
}

/// Consumes `c` when the text starts with it.
pub fn accept_char(text: &mut &str, c: char) -> bool {
    match text.strip_prefix(c) {
        Some(rest) => {
            *text = rest;
            true
        }
        None => false,
    }
}

/// Consumes `prefix` when the text starts with it.
pub fn accept_str(text: &mut &str, prefix: &str) -> bool {
    match text.strip_prefix(prefix) {
        Some(rest) => {
            *text = rest;
            true
        }
        None => false,
    }
}

/// Skips leading spaces, tabs, and line breaks.
pub fn skip_whitespace(text: &mut &str) {
    *text = text.trim_start_matches([' ', '\t', '\r', '\n']);
}

/// Returns the text without trailing spaces, tabs, and line breaks.
pub fn trim_trailing_whitespace(text: &str) -> &str {
    text.trim_end_matches([' ', '\t', '\r', '\n'])
}
