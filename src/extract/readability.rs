//! Readability-style primary extraction pass.
//!
//! Works on a clone of the parsed document:
//!
//! 1. Remove boilerplate element kinds (scripts, navigation, forms, media …).
//! 2. Remove every element whose `class` or `id` matches
//!    [`BOILERPLATE_PATTERN`].  The root `<html>` and `<body>` are exempt.
//! 3. Pick the first match from [`CONTENT_SELECTORS`], in priority order,
//!    falling back to `<body>`.
//! 4. Take the title from the first `<h1>`, else `<title>`.
//! 5. Normalise the container's text.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html};

use super::{body_of, normalize_text, readable_text, remove_matching, selector, title_of};
use super::{Article, ExtractError};

/// Element kinds that never carry main content.
pub const BOILERPLATE_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "form", "button",
    "input", "select", "textarea", "svg", "canvas", "video", "audio",
];

/// Case-insensitive keywords matched against `class` + `id`.
pub const BOILERPLATE_PATTERN: &str = "(?i)nav|sidebar|footer|header|menu|ad|advertisement|banner|social|share|comment|related|widget|popup|modal";

/// Content containers, highest priority first.
pub const CONTENT_SELECTORS: &[&str] = &[
    "article",
    "main",
    "[role=\"main\"]",
    ".post",
    ".entry",
    ".content",
    ".article",
    "#content",
    "#main",
];

fn boilerplate_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(BOILERPLATE_PATTERN).expect("static regex"))
}

/// Run the readability pass over `source` without modifying it.
pub fn parse(source: &Html) -> Result<Article, ExtractError> {
    let mut doc = source.clone();

    for tag in BOILERPLATE_TAGS {
        remove_matching(&mut doc, tag)?;
    }
    remove_by_class_or_id(&mut doc);

    let content = find_container(&doc)?;
    let text = normalize_text(&readable_text(content));
    let title = title_of(&doc);

    Ok(Article { title, text })
}

/// Detach elements whose class/id looks like page chrome.
fn remove_by_class_or_id(doc: &mut Html) {
    let pattern = boilerplate_regex();
    let ids: Vec<_> = doc
        .root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|el| !matches!(el.value().name(), "html" | "body"))
        .filter(|el| {
            let value = el.value();
            let class_and_id = format!(
                "{} {}",
                value.attr("class").unwrap_or(""),
                value.id().unwrap_or("")
            );
            pattern.is_match(&class_and_id)
        })
        .map(|el| el.id())
        .collect();

    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

fn find_container(doc: &Html) -> Result<ElementRef<'_>, ExtractError> {
    for css in CONTENT_SELECTORS {
        let sel = selector(css)?;
        if let Some(el) = doc.select(&sel).next() {
            return Ok(el);
        }
    }
    body_of(doc)
}
