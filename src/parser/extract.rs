use std::sync::LazyLock;

use scraper::{Html, Selector};

use super::blocks::{classify_document, visible_text, Block};
use super::sections::{self, Section};

static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("head > title").unwrap());
static ANY_TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static NOTE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"div[role="note"]"#).unwrap());
static CATLINKS_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("#mw-normal-catlinks").unwrap());
static ANCHOR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a").unwrap());

/// Spellings that mark a hatnote as a "see also" pointer. Matching is
/// case-sensitive on purpose: "SEE ALSO" in running text is not a hatnote.
const SEE_ALSO_NOTE_MARKERS: &[&str] = &["See also", "see also", "See Also"];
const EDIT_LABEL: &str = "edit";
const CATEGORIES_LABEL: &str = "Categories";
const TITLE_SEPARATOR: &str = " - ";

/// A titled outbound link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    pub title: String,
    pub href: String,
}

impl LinkRef {
    pub fn new(title: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
        }
    }
}

/// A parsed article, queryable for sections, notes, categories and title.
pub struct Document {
    html: Html,
    blocks: Vec<Block>,
}

impl Document {
    pub fn parse(markup: &str) -> Self {
        let html = Html::parse_document(markup);
        let blocks = classify_document(&html);
        Self { html, blocks }
    }

    pub fn sections(&self) -> Vec<String> {
        sections::headings(&self.blocks)
    }

    pub fn section_body(&self, heading: &str) -> Option<Section> {
        sections::section_body(&self.blocks, heading)
    }

    /// The first section whose heading mentions "see also", if any.
    pub fn see_also_section(&self) -> Option<Section> {
        let heading = self
            .sections()
            .into_iter()
            .find(|h| sections::is_see_also_heading(h))?;
        self.section_body(&heading)
    }

    /// Links inside every `role="note"` block that mentions "see also".
    pub fn embedded_see_also_notes(&self) -> Vec<LinkRef> {
        let mut links = Vec::new();
        for note in self.html.select(&NOTE_SEL) {
            let text: String = note.text().collect();
            if !SEE_ALSO_NOTE_MARKERS.iter().any(|m| text.contains(m)) {
                continue;
            }
            for anchor in note.select(&ANCHOR_SEL) {
                let Some(href) = anchor.value().attr("href") else {
                    continue;
                };
                let title = visible_text(&anchor);
                if !title.is_empty() {
                    links.push(LinkRef::new(title, href));
                }
            }
        }
        links
    }

    /// Category names from the normal category-links block; empty when absent.
    pub fn categories(&self) -> Vec<String> {
        let Some(block) = self.html.select(&CATLINKS_SEL).next() else {
            return Vec::new();
        };
        block
            .select(&ANCHOR_SEL)
            .map(|a| visible_text(&a))
            .filter(|t| !t.is_empty() && t != CATEGORIES_LABEL)
            .collect()
    }

    /// Canonical title: the `<title>` text up to the first " - ".
    pub fn title(&self) -> Option<String> {
        let element = self
            .html
            .select(&TITLE_SEL)
            .next()
            .or_else(|| self.html.select(&ANY_TITLE_SEL).next())?;
        let text = visible_text(&element);
        let title = text.split(TITLE_SEPARATOR).next().unwrap_or("").trim();
        (!title.is_empty()).then(|| title.to_string())
    }
}

/// Every anchor of a section except edit affordances and anchors without an href.
pub fn links_in(section: &Section) -> Vec<LinkRef> {
    section
        .blocks
        .iter()
        .filter_map(|b| match b {
            Block::Link {
                text,
                href: Some(href),
            } if text != EDIT_LABEL && !text.is_empty() => Some(LinkRef::new(text.clone(), href.clone())),
            _ => None,
        })
        .collect()
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> Document {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        Document::parse(&html)
    }

    #[test]
    fn graph_theory_title_and_sections() {
        let doc = fixture("graph_theory");
        assert_eq!(doc.title().as_deref(), Some("Graph theory"));
        let sections = doc.sections();
        assert_eq!(sections.first().map(String::as_str), Some("Contents"));
        assert!(sections.iter().any(|s| s == "See also"));
        assert_eq!(sections.last().map(String::as_str), Some("References"));
    }

    #[test]
    fn graph_theory_see_also_links() {
        let doc = fixture("graph_theory");
        let section = doc.see_also_section().unwrap();
        let titles: Vec<String> = links_in(&section).into_iter().map(|l| l.title).collect();
        assert_eq!(
            titles,
            vec![
                "Combinatorics",
                "Network science",
                "Spectral graph theory",
                "Network science",
            ]
        );
    }

    #[test]
    fn graph_theory_notes_and_categories() {
        let doc = fixture("graph_theory");
        let notes = doc.embedded_see_also_notes();
        assert_eq!(
            notes,
            vec![
                LinkRef::new("Glossary of graph theory", "/wiki/Glossary_of_graph_theory"),
                LinkRef::new("Graph (abstract data type)", "/wiki/Graph_(abstract_data_type)"),
            ]
        );
        assert_eq!(
            doc.categories(),
            vec!["Graph theory", "Combinatorics"]
        );
    }

    #[test]
    fn legacy_markup_skips_edit_links() {
        let doc = fixture("legacy_see_also");
        assert_eq!(doc.title().as_deref(), Some("Spectral clustering"));
        let section = doc.see_also_section().unwrap();
        assert_eq!(section.heading, "See Also[edit]");
        let links = links_in(&section);
        assert_eq!(
            links,
            vec![
                LinkRef::new("Cluster analysis", "/wiki/Cluster_analysis"),
                LinkRef::new("Spectral graph theory", "/wiki/Spectral_graph_theory"),
            ]
        );
    }

    #[test]
    fn stub_without_see_also_or_categories() {
        let doc = fixture("stub");
        assert_eq!(doc.title().as_deref(), Some("Combinatorics"));
        assert!(doc.see_also_section().is_none());
        assert!(doc.categories().is_empty());
    }

    #[test]
    fn missing_title_is_none() {
        let doc = Document::parse("<html><body><h2>See also</h2></body></html>");
        assert!(doc.title().is_none());
        assert_eq!(doc.section_body("See also").map(|s| s.blocks.len()), Some(0));
    }

    #[test]
    fn notes_without_marker_are_ignored() {
        let doc = Document::parse(
            r#"<div role="note">Main article: <a href="/wiki/X">X</a></div>
               <div role="note">See also: <a href="/wiki/Y">Y</a> and <a>Z</a></div>"#,
        );
        assert_eq!(doc.embedded_see_also_notes(), vec![LinkRef::new("Y", "/wiki/Y")]);
    }
}
