//! Whitespace normalisation for extracted text.

use std::sync::OnceLock;

use regex::{Captures, Regex};

fn whitespace_run() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// Collapse whitespace in `text` and trim it.
///
/// A whitespace run spanning two or more line breaks becomes exactly one
/// blank line (`"\n\n"`); every other run becomes a single space.
///
/// ```
/// use read_aloud::extract::normalize_text;
///
/// assert_eq!(normalize_text("  a \t b\n c  "), "a b c");
/// assert_eq!(normalize_text("one\n \n\n\n two"), "one\n\ntwo");
/// ```
pub fn normalize_text(text: &str) -> String {
    whitespace_run()
        .replace_all(text, |caps: &Captures<'_>| {
            let newlines = caps[0].chars().filter(|&c| c == '\n').count();
            if newlines >= 2 {
                "\n\n"
            } else {
                " "
            }
        })
        .trim()
        .to_string()
}
