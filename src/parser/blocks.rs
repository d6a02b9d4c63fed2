use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
/// Article body containers, most specific first.
static CONTENT_ROOT_SELS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [".mw-parser-output", "#mw-content-text", "body"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect()
});

/// A structural element of an article body, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading { level: u8, text: String },
    Link { text: String, href: Option<String> },
}

/// Flatten a parsed document into the headings and anchors of its article
/// body. Navigation, category links and footers outside the body are left out.
///
/// Anchors nested inside a heading (edit links) come right after the heading
/// block, so they land in that heading's section body.
pub fn classify_document(doc: &Html) -> Vec<Block> {
    let mut blocks = Vec::new();

    for element in content_root(doc).descendent_elements() {
        let name = element.value().name();
        if let Some(level) = heading_level(name) {
            blocks.push(Block::Heading {
                level,
                text: visible_text(&element),
            });
        } else if name == "a" {
            blocks.push(Block::Link {
                text: visible_text(&element),
                href: element.value().attr("href").map(str::to_string),
            });
        }
    }

    blocks
}

fn content_root(doc: &Html) -> ElementRef<'_> {
    CONTENT_ROOT_SELS
        .iter()
        .find_map(|sel| doc.select(sel).next())
        .unwrap_or_else(|| doc.root_element())
}

fn heading_level(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Text content of an element with runs of whitespace collapsed.
pub fn visible_text(element: &ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    WHITESPACE_RE.replace_all(raw.trim(), " ").into_owned()
}

// ── Tests ──
