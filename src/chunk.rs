//! Sentence-aware text chunking.
//!
//! [`chunk_text`] splits text into an ordered list of [`Segment`]s, each at
//! most `max_chars` characters, preferring to cut between sentences.  A
//! sentence is a run of characters ending in `.`, `!` or `?`; text after the
//! last terminal mark forms a final sentence of its own.
//!
//! A single sentence longer than `max_chars` is emitted as one oversized
//! segment rather than being cut mid-sentence.
//!
//! ```
//! use read_aloud::chunk::chunk_text;
//!
//! let segments = chunk_text("Hello world. This is a test. Short.", 20);
//! let texts: Vec<&str> = segments.iter().map(|s| s.text()).collect();
//! assert_eq!(texts, ["Hello world.", "This is a test.", "Short."]);
//! ```

use std::sync::OnceLock;

use regex::Regex;

/// Segment size used when the configuration does not say otherwise.
pub const DEFAULT_MAX_SEGMENT_CHARS: usize = 4_000;

fn sentence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^.!?]+[.!?]+").expect("static regex"))
}

// ---------------------------------------------------------------------------
// Segment
// ---------------------------------------------------------------------------

/// One bounded unit of text queued for synthesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    index: usize,
    text: String,
}

impl Segment {
    /// Position of this segment in its queue (0-based).
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// First `max` characters, for log lines.
    pub fn preview(&self, max: usize) -> String {
        let mut out: String = self.text.chars().take(max).collect();
        if self.text.chars().nth(max).is_some() {
            out.push_str("...");
        }
        out
    }
}

// ---------------------------------------------------------------------------
// chunk_text
// ---------------------------------------------------------------------------

/// Split `text` into sentence-sized units, in order.
///
/// Returns the whole input as a single unit when it contains no terminal
/// punctuation.
fn sentences(text: &str) -> Vec<&str> {
    let mut units = Vec::new();
    let mut consumed = 0;

    for m in sentence_pattern().find_iter(text) {
        // Only a leading run of punctuation can fall between matches.
        if m.start() > consumed {
            units.push(&text[consumed..m.start()]);
        }
        units.push(m.as_str());
        consumed = m.end();
    }

    if consumed < text.len() {
        units.push(&text[consumed..]);
    }

    units
}

/// Split `text` into segments of at most `max_chars` characters.
///
/// Units are accumulated greedily: when appending the next sentence would
/// push the buffer past `max_chars`, the buffer is closed (trimmed) and the
/// sentence starts a new one.  Whitespace-only segments are dropped.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<Segment> {
    let max_chars = max_chars.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for unit in sentences(text) {
        let unit_len = unit.chars().count();
        if current_len + unit_len > max_chars {
            if !current.is_empty() {
                chunks.push(current.trim().to_string());
            }
            current = unit.to_string();
            current_len = unit_len;
        } else {
            current.push_str(unit);
            current_len += unit_len;
        }
    }

    if !current.is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .enumerate()
        .map(|(index, text)| Segment { index, text })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
