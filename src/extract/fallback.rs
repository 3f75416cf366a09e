//! Basic fallback extraction.
//!
//! Used when the readability pass errors, finds nothing, or is disabled.
//! Strips a smaller set of boilerplate from a copy of the document, then
//! reads the first content container in document order, else the whole
//! body.

use scraper::Html;

use super::{body_of, normalize_text, readable_text, remove_matching, selector, ExtractError};

/// Selectors removed before reading text.
pub const UNWANTED_SELECTORS: &[&str] = &[
    "script",
    "style",
    "nav",
    "header",
    "footer",
    "aside",
    "iframe",
    "noscript",
    ".ad",
    ".advertisement",
    ".sidebar",
    "[role=\"navigation\"]",
    "[role=\"banner\"]",
    "[role=\"contentinfo\"]",
];

/// Containers tried as one selector group; the first in document order wins.
pub const CONTAINER_SELECTOR: &str =
    "main, article, [role=\"main\"], .content, .post, .entry";

/// Run the fallback pass; returns normalised text (possibly empty).
pub fn parse(source: &Html) -> Result<String, ExtractError> {
    let mut doc = source.clone();

    for css in UNWANTED_SELECTORS {
        remove_matching(&mut doc, css)?;
    }

    let container = selector(CONTAINER_SELECTOR)?;
    let text_source = match doc.select(&container).next() {
        Some(el) => el,
        None => body_of(&doc)?,
    };

    Ok(normalize_text(&readable_text(text_source)))
}
