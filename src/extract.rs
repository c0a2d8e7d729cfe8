//! Title, body, and summary extraction from rendered HTML.
//!
//! Body text comes from an ordered chain of [`ContentStrategy`]s; the first
//! one yielding non-empty text wins, and the page's whole visible text is the
//! fallback.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};

pub const TITLE_PLACEHOLDER: &str = "No Title Found";
pub const SUMMARY_ELLIPSIS: &str = "...";

/// Elements whose text is never shown to a reader.
const INVISIBLE: &[&str] = &["script", "style", "noscript", "template"];

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("valid selector"));

/// A single content-container heuristic.
pub struct ContentStrategy {
    pub name: &'static str,
    selector: Selector,
}

impl ContentStrategy {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            selector: Selector::parse(name).expect("valid selector"),
        }
    }

    /// Text of the first matching element, if it has any.
    pub fn extract(&self, document: &Html) -> Option<String> {
        document
            .select(&self.selector)
            .next()
            .map(visible_text)
            .filter(|text| !text.is_empty())
    }
}

/// Content containers in priority order.
pub static CONTENT_STRATEGIES: Lazy<Vec<ContentStrategy>> = Lazy::new(|| {
    ["article", "main", ".post-content", ".article-body", "#content"]
        .into_iter()
        .map(ContentStrategy::new)
        .collect()
});

/// What a crawl worker keeps from a page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub title: String,
    pub body: String,
    /// Name of the strategy that produced the body, `None` for the fallback.
    pub strategy: Option<&'static str>,
}

/// Trimmed, non-empty text nodes under `element`, one per line, skipping
/// script and style content.
pub fn visible_text(element: ElementRef<'_>) -> String {
    element
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node.ancestors().any(|ancestor| match ancestor.value() {
                Node::Element(el) => INVISIBLE.contains(&el.name()),
                _ => false,
            });
            (!hidden).then(|| text.trim())
        })
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The trimmed `<title>` text, or [`TITLE_PLACEHOLDER`] when the page has
/// none.
pub fn extract_title(document: &Html) -> String {
    document
        .select(&TITLE)
        .next()
        .map(|title| title.text().collect::<String>().trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| TITLE_PLACEHOLDER.to_string())
}

/// Body text from the first [`ContentStrategy`] that yields any, falling
/// back to every visible text node on the page.
///
/// # Arguments
///
/// * `document` - The parsed page
///
/// # Returns
///
/// The body text and the name of the strategy that produced it, or `None`
/// as the name when the whole-page fallback was used.
pub fn extract_body(document: &Html) -> (String, Option<&'static str>) {
    CONTENT_STRATEGIES
        .iter()
        .find_map(|strategy| strategy.extract(document).map(|text| (text, Some(strategy.name))))
        .unwrap_or_else(|| (visible_text(document.root_element()), None))
}

/// Parse `html` and extract its title and body in one pass.
pub fn extract_page(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);
    let title = extract_title(&document);
    let (body, strategy) = extract_body(&document);
    ExtractedPage {
        title,
        body,
        strategy,
    }
}

/// The first `lines` lines of `body` joined by spaces, plus an ellipsis.
pub fn build_summary(body: &str, lines: usize) -> String {
    let head = body.lines().take(lines).collect::<Vec<_>>().join(" ");
    format!("{head}{SUMMARY_ELLIPSIS}")
}
