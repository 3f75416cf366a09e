//! Main-content extraction from HTML documents.
//!
//! # Two tiers
//!
//! ```text
//! Document (owned HTML) ──parse──▶ scraper::Html
//!        │
//!        ├─ readability pass (clone, strip boilerplate, pick container, title)
//!        │      └─ error / empty ─┐
//!        │                        ▼
//!        └─────────────── fallback pass (smaller tag set, narrower containers)
//!                                 │
//!                                 ▼
//!                 normalize_text ──▶ Extraction::{Content, Empty}
//! ```
//!
//! Extraction never fails past [`ContentExtractor::extract`]: an error in
//! the readability pass is logged and recovered by the fallback pass, and a
//! page with nothing readable yields [`Extraction::Empty`] rather than an
//! empty string.
//!
//! Parsing happens inside `extract` so [`Document`] stays a plain owned
//! snapshot that can be moved across tasks; the parsed tree is dropped
//! before returning.
//!
//! ```
//! use read_aloud::extract::{ContentExtractor, Document, Extraction};
//!
//! let doc = Document::new(
//!     "<html><body><nav>Home | About</nav><article><h1>Title</h1>\
//!      <p>The story.</p></article></body></html>",
//! );
//! match ContentExtractor::new().extract(&doc) {
//!     Extraction::Content(article) => {
//!         assert_eq!(article.title.as_deref(), Some("Title"));
//!         assert_eq!(article.text, "Title The story.");
//!     }
//!     Extraction::Empty => unreachable!(),
//! }
//! ```

pub mod fallback;
pub mod normalize;
pub mod readability;

pub use normalize::normalize_text;

use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// An owned snapshot of a page's HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub html: String,
    /// Where the snapshot came from, for log lines only.
    pub url: Option<String>,
}

impl Document {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Article / Extraction
// ---------------------------------------------------------------------------

/// Readable content pulled out of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// First `<h1>`, else the `<title>`; `None` when neither has text.
    pub title: Option<String>,
    /// Normalised main-content text; never empty.
    pub text: String,
}

/// Result of [`ContentExtractor::extract`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Content(Article),
    /// Both tiers produced only whitespace.
    Empty,
}

impl Extraction {
    /// The extracted text, or `None` for [`Extraction::Empty`].
    pub fn text(&self) -> Option<&str> {
        match self {
            Extraction::Content(article) => Some(&article.text),
            Extraction::Empty => None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExtractError
// ---------------------------------------------------------------------------

/// Failures inside a single extraction pass.  Never surfaced by
/// [`ContentExtractor::extract`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid selector `{selector}`: {reason}")]
    Selector { selector: String, reason: String },

    #[error("document has no <body>")]
    MissingBody,
}

// ---------------------------------------------------------------------------
// ContentExtractor
// ---------------------------------------------------------------------------

/// Two-tier main-content extractor.
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    readability: bool,
}

impl Default for ContentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor {
    /// Extractor with both tiers enabled.
    pub fn new() -> Self {
        Self { readability: true }
    }

    /// Extractor whose readability tier is unavailable; only the fallback
    /// pass runs.
    pub fn fallback_only() -> Self {
        Self { readability: false }
    }

    /// Extract the main content of `doc`.
    pub fn extract(&self, doc: &Document) -> Extraction {
        let source = Html::parse_document(&doc.html);
        let label = doc.url.as_deref().unwrap_or("<document>");

        if self.readability {
            match readability::parse(&source) {
                Ok(article) if !article.text.is_empty() => {
                    log::debug!(
                        "extract: readability pass on {label} -> {} chars",
                        article.text.len()
                    );
                    return Extraction::Content(article);
                }
                Ok(_) => log::debug!("extract: readability pass on {label} found no text"),
                Err(e) => {
                    log::info!("extract: readability failed on {label} ({e}), falling back")
                }
            }
        }

        match fallback::parse(&source) {
            Ok(text) if !text.is_empty() => {
                log::debug!("extract: fallback pass on {label} -> {} chars", text.len());
                Extraction::Content(Article {
                    title: title_of(&source),
                    text,
                })
            }
            Ok(_) => {
                log::info!("extract: no readable content in {label}");
                Extraction::Empty
            }
            Err(e) => {
                log::warn!("extract: fallback failed on {label}: {e}");
                Extraction::Empty
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Shared tree helpers
// ---------------------------------------------------------------------------

/// Elements that end a line of text when collected.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "blockquote", "dd", "div", "dl", "dt", "figcaption", "figure", "h1",
    "h2", "h3", "h4", "h5", "h6", "hr", "li", "main", "ol", "p", "pre", "section", "table", "td",
    "th", "tr", "ul",
];

pub(crate) fn selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::Selector {
        selector: css.to_string(),
        reason: e.to_string(),
    })
}

/// Detach every element matching `css` from `html`.
pub(crate) fn remove_matching(html: &mut Html, css: &str) -> Result<usize, ExtractError> {
    let sel = selector(css)?;
    let ids: Vec<_> = html.select(&sel).map(|el| el.id()).collect();
    let count = ids.len();
    for id in ids {
        if let Some(mut node) = html.tree.get_mut(id) {
            node.detach();
        }
    }
    Ok(count)
}

/// The `<body>` element of `html`.
pub(crate) fn body_of(html: &Html) -> Result<ElementRef<'_>, ExtractError> {
    let sel = selector("body")?;
    html.select(&sel).next().ok_or(ExtractError::MissingBody)
}

/// Concatenated text of `element`, with a line break after block elements
/// so adjacent paragraphs do not run together.
pub(crate) fn readable_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                if el.name() == "br" {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if BLOCK_ELEMENTS.contains(&el.name()) {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// First `<h1>` text, else the `<title>` text.
pub(crate) fn title_of(html: &Html) -> Option<String> {
    ["h1", "title"].iter().find_map(|css| {
        let sel = selector(css).ok()?;
        let el = html.select(&sel).next()?;
        let title = normalize_text(&el.text().collect::<String>());
        (!title.is_empty()).then_some(title)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(html: &str) -> Extraction {
        ContentExtractor::new().extract(&Document::new(html))
    }

    #[test]
    fn nav_and_script_only_is_empty() {
        let html = "<html><head><title>T</title></head><body>\
                    <nav><a href='/'>Home</a> <a href='/b'>Blog</a></nav>\
                    <script>var x = 'not text';</script>\
                    </body></html>";
        assert_eq!(extract(html), Extraction::Empty);
        assert_eq!(
            ContentExtractor::fallback_only().extract(&Document::new(html)),
            Extraction::Empty
        );
    }

    #[test]
    fn article_content_wins_over_surrounding_chrome() {
        let html = "<html><head><title>Site</title></head><body>\
                    <header>Site header</header>\
                    <div class='sidebar'>Links</div>\
                    <article><h1>Headline</h1><p>First paragraph.</p><p>Second one.</p></article>\
                    <footer>Copyright</footer></body></html>";
        let Extraction::Content(article) = extract(html) else {
            panic!("expected content");
        };
        assert_eq!(article.title.as_deref(), Some("Headline"));
        assert_eq!(article.text, "Headline First paragraph. Second one.");
    }

    #[test]
    fn falls_back_to_body_without_container() {
        let html = "<html><body><p>Just a body.</p><p>Two paragraphs.</p></body></html>";
        assert_eq!(extract(html).text(), Some("Just a body. Two paragraphs."));
    }

    #[test]
    fn title_comes_from_title_element_without_h1() {
        let html = "<html><head><title> Page  Title </title></head>\
                    <body><main><p>Body text.</p></main></body></html>";
        let Extraction::Content(article) = extract(html) else {
            panic!("expected content");
        };
        assert_eq!(article.title.as_deref(), Some("Page Title"));
        assert_eq!(article.text, "Body text.");
    }

    #[test]
    fn source_document_is_untouched() {
        let html = "<html><body><nav>Menu</nav><article><p>Text.</p></article></body></html>";
        let doc = Document::new(html);
        let before = doc.clone();
        let _ = ContentExtractor::new().extract(&doc);
        assert_eq!(doc, before);
    }

    #[test]
    fn fallback_only_still_extracts() {
        let html = "<html><body><nav>Menu</nav><div class='post'><p>Post body.</p></div></body></html>";
        let extraction = ContentExtractor::fallback_only().extract(&Document::new(html));
        assert_eq!(extraction.text(), Some("Post body."));
    }

    #[test]
    fn inline_elements_do_not_add_breaks() {
        let html = "<html><body><p>Bo<b>ld</b> and <i>italic</i>.</p></body></html>";
        assert_eq!(extract(html).text(), Some("Bold and italic."));
    }

    #[test]
    fn remove_matching_detaches_elements() {
        let mut html = Html::parse_document("<body><p>a</p><script>x</script><p>b</p></body>");
        assert_eq!(remove_matching(&mut html, "script").unwrap(), 1);
        let body = body_of(&html).unwrap();
        assert_eq!(normalize_text(&readable_text(body)), "a b");
    }

    #[test]
    fn bad_selector_is_an_error() {
        assert!(matches!(selector("[[["), Err(ExtractError::Selector { .. })));
    }
}
