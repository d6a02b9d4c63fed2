pub mod blocks;
pub mod extract;
pub mod sections;

use tracing::debug;
use url::Url;

use crate::error::PipelineError;
use extract::{links_in, Document, LinkRef};

/// What the crawler keeps from one fetched article.
#[derive(Debug, Clone)]
pub struct PageRecord {
    pub url: Url,
    pub title: String,
    pub categories: Vec<String>,
    /// `None` when the page has no "See also" section.
    pub see_also: Option<Vec<LinkRef>>,
}

/// markup → blocks → sections → page record.
pub fn process_page(url: &Url, markup: &str) -> Result<PageRecord, PipelineError> {
    let doc = Document::parse(markup);
    let title = doc
        .title()
        .ok_or_else(|| PipelineError::parse(url.as_str(), "missing <title> metadata"))?;

    let see_also = doc.see_also_section().map(|section| {
        debug!(url = %url, heading = %section.heading, "found see-also section");
        let mut links = links_in(&section);
        links.extend(doc.embedded_see_also_notes());
        links
    });

    Ok(PageRecord {
        url: url.clone(),
        title,
        categories: doc.categories(),
        see_also,
    })
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn page(fixture: &str) -> Result<PageRecord, PipelineError> {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", fixture)).unwrap();
        let url = Url::parse("https://en.wikipedia.org/wiki/Fixture").unwrap();
        process_page(&url, &html)
    }

    #[test]
    fn section_links_come_before_note_links() {
        let record = page("graph_theory").unwrap();
        assert_eq!(record.title, "Graph theory");
        let titles: Vec<&str> = record
            .see_also
            .as_ref()
            .unwrap()
            .iter()
            .map(|l| l.title.as_str())
            .collect();
        assert_eq!(titles.first(), Some(&"Combinatorics"));
        assert_eq!(titles.last(), Some(&"Graph (abstract data type)"));
        assert_eq!(titles.len(), 6);
    }

    #[test]
    fn trailing_see_also_stops_at_the_article_body() {
        let record = page("see_also_last").unwrap();
        assert_eq!(record.title, "K-means clustering");
        let see_also = record.see_also.unwrap();
        assert_eq!(see_also, vec![LinkRef::new("Cluster analysis", "/wiki/Cluster_analysis")]);
        assert_eq!(record.categories, vec!["Cluster analysis algorithms"]);
    }

    #[test]
    fn page_without_see_also_keeps_metadata() {
        let record = page("stub").unwrap();
        assert_eq!(record.title, "Combinatorics");
        assert!(record.see_also.is_none());
        assert!(record.categories.is_empty());
    }

    #[test]
    fn missing_title_is_a_parse_error() {
        let url = Url::parse("https://en.wikipedia.org/wiki/Broken").unwrap();
        let err = process_page(&url, "<html><body><p>nothing</p></body></html>").unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }
}
