use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CrawlConfig, QueueOrder};
use crate::error::PipelineError;
use crate::fetcher::{resolve, same_origin, PageFetcher};
use crate::parser::{self, PageRecord};
use crate::store::CrawlStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Initialized,
    Running,
    Done,
}

/// Counters returned after a crawl.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    pub fetched: usize,
    pub failed: usize,
    pub expanded: usize,
    pub enqueued: usize,
}

/// Work queue plus the set of URLs ever enqueued.
struct Frontier {
    queue: VecDeque<(Url, usize)>,
    visited: HashSet<String>,
    order: QueueOrder,
}

impl Frontier {
    fn new(order: QueueOrder) -> Self {
        Self {
            queue: VecDeque::new(),
            visited: HashSet::new(),
            order,
        }
    }

    fn push_if_unvisited(&mut self, url: Url, depth: usize) -> bool {
        if !self.visited.insert(url.as_str().to_string()) {
            return false;
        }
        match self.order {
            QueueOrder::Fifo => self.queue.push_back((url, depth)),
            QueueOrder::Lifo => self.queue.push_front((url, depth)),
        }
        true
    }

    fn pop(&mut self) -> Option<(Url, usize)> {
        self.queue.pop_front()
    }
}

/// Depth-bounded traversal of "See also" links from a single seed page.
///
/// Fetches run on up to `concurrency` tasks; their results come back over a
/// channel and only this loop touches the [`CrawlStore`].
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    config: CrawlConfig,
    state: CrawlState,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: CrawlConfig) -> Self {
        Self {
            fetcher,
            config,
            state: CrawlState::Initialized,
        }
    }

    pub fn state(&self) -> CrawlState {
        self.state
    }

    pub async fn run(&mut self, seed: &str, store: &mut CrawlStore) -> Result<CrawlStats> {
        if self.state != CrawlState::Initialized {
            return Err(anyhow!("crawler already used (state {:?})", self.state));
        }
        let seed_url = resolve(&self.config.base, seed)
            .ok_or_else(|| anyhow!("seed {seed:?} is not a valid URL or path"))?;

        self.state = CrawlState::Running;
        info!(
            seed = %seed_url,
            max_depth = self.config.max_depth,
            order = ?self.config.order,
            concurrency = self.config.concurrency,
            "starting crawl"
        );

        let mut frontier = Frontier::new(self.config.order);
        frontier.push_if_unvisited(seed_url, 0);

        let concurrency = self.config.concurrency.max(1);
        let (tx, mut rx) =
            mpsc::channel::<(usize, Result<PageRecord, PipelineError>)>(concurrency * 2);

        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);

        let mut stats = CrawlStats {
            enqueued: 1,
            ..CrawlStats::default()
        };
        let mut dispatched = 0usize;
        let mut in_flight = 0usize;

        loop {
            while in_flight < concurrency && !self.budget_spent(dispatched) {
                let Some((url, depth)) = frontier.pop() else {
                    break;
                };
                if depth > self.config.max_depth {
                    continue;
                }
                dispatched += 1;
                in_flight += 1;

                let fetcher = Arc::clone(&self.fetcher);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let result = fetch_and_parse(fetcher.as_ref(), &url).await;
                    let _ = tx.send((depth, result)).await;
                });
            }

            if in_flight == 0 {
                break;
            }
            let Some((depth, result)) = rx.recv().await else {
                break;
            };
            in_flight -= 1;

            match result {
                Ok(record) => {
                    stats.fetched += 1;
                    self.apply(record, depth, store, &mut frontier, &mut stats);
                }
                Err(e) if e.is_node_local() => {
                    stats.failed += 1;
                    warn!("Skipping page: {}", e);
                }
                Err(e) => {
                    pb.finish_and_clear();
                    return Err(e.into());
                }
            }
            pb.set_message(format!(
                "{} fetched, {} failed, {} queued",
                stats.fetched,
                stats.failed,
                frontier.queue.len()
            ));
            pb.tick();
        }

        pb.finish_and_clear();
        self.state = CrawlState::Done;
        info!(
            "Crawl finished: {} fetched, {} failed, {} expanded",
            stats.fetched, stats.failed, stats.expanded
        );
        Ok(stats)
    }

    fn budget_spent(&self, dispatched: usize) -> bool {
        self.config.max_pages.is_some_and(|max| dispatched >= max)
    }

    /// Fold one page into the store and queue its unseen links.
    fn apply(
        &self,
        record: PageRecord,
        depth: usize,
        store: &mut CrawlStore,
        frontier: &mut Frontier,
        stats: &mut CrawlStats,
    ) {
        let base = &self.config.base;
        let title = record.title;
        store.record_link_if_absent(&title, record.url.as_str());
        store.record_categories_if_absent(&title, record.categories);

        let Some(mut links) = record.see_also else {
            debug!(title = %title, "no see-also section");
            return;
        };
        links.retain(|link| !is_in_page_anchor(&link.href));

        if !store.is_expanded(&title) {
            let mut seen = HashSet::new();
            let neighbours: Vec<String> = links
                .iter()
                .filter(|l| seen.insert(l.title.as_str()))
                .map(|l| l.title.clone())
                .collect();
            store.record_adjacency_if_absent(&title, neighbours);
            stats.expanded += 1;

            for link in &links {
                if let Some(url) = resolve(base, &link.href) {
                    store.record_link_if_absent(&link.title, url.as_str());
                }
            }
        }

        if depth + 1 > self.config.max_depth {
            return;
        }
        for link in &links {
            let Some(url) = resolve(base, &link.href) else {
                continue;
            };
            if !same_origin(base, &url) {
                continue;
            }
            if frontier.push_if_unvisited(url, depth + 1) {
                stats.enqueued += 1;
            }
        }
    }
}

/// Fragment-only hrefs (`#Notes`) point into the current page, and would
/// otherwise resolve to the bare base origin.
fn is_in_page_anchor(href: &str) -> bool {
    href.trim_start().starts_with('#')
}

async fn fetch_and_parse(
    fetcher: &dyn PageFetcher,
    url: &Url,
) -> Result<PageRecord, PipelineError> {
    let page = fetcher.fetch(url).await?;
    parser::process_page(&page.url, &page.body)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::fetcher::FetchedPage;

    const BASE: &str = "https://wiki.test/";

    /// Serves canned articles keyed by absolute URL and logs every request.
    struct StaticFetcher {
        pages: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl StaticFetcher {
        fn new(pages: Vec<(&str, String)>) -> Self {
            Self {
                pages: pages
                    .into_iter()
                    .map(|(slug, html)| (format!("{BASE}wiki/{slug}"), html))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|u| u.trim_start_matches(BASE).trim_start_matches("wiki/").to_string())
                .collect()
        }
    }

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage, PipelineError> {
            self.calls.lock().unwrap().push(url.to_string());
            match self.pages.get(url.as_str()) {
                Some(body) => Ok(FetchedPage {
                    url: url.clone(),
                    body: body.clone(),
                    latency_ms: 0,
                }),
                None => Err(PipelineError::fetch(url.as_str(), "HTTP 404 Not Found")),
            }
        }
    }

    fn article(title: &str, see_also: Option<&[&str]>, categories: &[&str]) -> String {
        let mut html = format!("<html><head><title>{title} - Wikipedia</title></head><body>");
        html.push_str(&format!("<h1>{title}</h1><h2>Overview</h2><p>text</p>"));
        if let Some(links) = see_also {
            html.push_str("<h2>See also</h2><ul>");
            for link in links {
                html.push_str(&format!("<li><a href=\"/wiki/{link}\">{link}</a></li>"));
            }
            html.push_str("</ul>");
        }
        html.push_str("<h2>References</h2><div id=\"mw-normal-catlinks\"><a>Categories</a>");
        for cat in categories {
            html.push_str(&format!("<a href=\"/wiki/Category:{cat}\">{cat}</a>"));
        }
        html.push_str("</div></body></html>");
        html
    }

    fn config(depth: usize, order: QueueOrder) -> CrawlConfig {
        let mut config = CrawlConfig::new(Url::parse(BASE).unwrap(), depth);
        config.order = order;
        config
    }

    async fn crawl(
        fetcher: Arc<StaticFetcher>,
        config: CrawlConfig,
        store: &mut CrawlStore,
    ) -> CrawlStats {
        let mut crawler = Crawler::new(fetcher, config);
        assert_eq!(crawler.state(), CrawlState::Initialized);
        let stats = crawler.run("/wiki/A", store).await.unwrap();
        assert_eq!(crawler.state(), CrawlState::Done);
        stats
    }

    #[tokio::test]
    async fn depth_one_example() {
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", article("A", Some(&["B", "C"]), &["Letters"])),
            ("B", article("B", None, &["Letters"])),
            ("C", article("C", None, &[])),
        ]));
        let mut store = CrawlStore::new();
        let stats = crawl(Arc::clone(&fetcher), config(1, QueueOrder::Fifo), &mut store).await;

        assert_eq!(stats.fetched, 3);
        assert_eq!(store.adjacency().len(), 1);
        assert_eq!(store.adjacency()["A"], vec!["B".to_string(), "C".to_string()]);
        let titles: Vec<&str> = store.title_link().keys().map(String::as_str).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(store.title_link()["B"], "https://wiki.test/wiki/B");
        assert_eq!(store.categories()["B"], vec!["Letters".to_string()]);
        assert!(store.categories()["C"].is_empty());
    }

    #[tokio::test]
    async fn depth_zero_expands_only_the_seed() {
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", article("A", Some(&["B", "C"]), &[])),
            ("B", article("B", Some(&["D"]), &[])),
        ]));
        let mut store = CrawlStore::new();
        let stats = crawl(Arc::clone(&fetcher), config(0, QueueOrder::Fifo), &mut store).await;

        assert_eq!(fetcher.calls(), vec!["A"]);
        assert_eq!(stats.enqueued, 1);
        assert_eq!(store.adjacency()["A"], vec!["B".to_string(), "C".to_string()]);
        assert!(store.title_link().contains_key("C"));
    }

    #[tokio::test]
    async fn links_beyond_max_depth_are_never_fetched() {
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", article("A", Some(&["B"]), &[])),
            ("B", article("B", Some(&["C"]), &[])),
            ("C", article("C", Some(&["A"]), &[])),
        ]));
        let mut store = CrawlStore::new();
        crawl(Arc::clone(&fetcher), config(1, QueueOrder::Fifo), &mut store).await;

        assert_eq!(fetcher.calls(), vec!["A", "B"]);
        assert_eq!(store.adjacency()["B"], vec!["C".to_string()]);
        assert!(!store.categories().contains_key("C"));
    }

    #[tokio::test]
    async fn fifo_and_lifo_visit_orders() {
        let pages = || {
            vec![
                ("S", article("S", Some(&["A", "B"]), &[])),
                ("A", article("A", Some(&["C"]), &[])),
                ("B", article("B", None, &[])),
                ("C", article("C", None, &[])),
            ]
        };

        let fifo = Arc::new(StaticFetcher::new(pages()));
        let mut crawler = Crawler::new(fifo.clone(), config(3, QueueOrder::Fifo));
        crawler.run("/wiki/S", &mut CrawlStore::new()).await.unwrap();
        assert_eq!(fifo.calls(), vec!["S", "A", "B", "C"]);

        let lifo = Arc::new(StaticFetcher::new(pages()));
        let mut crawler = Crawler::new(lifo.clone(), config(3, QueueOrder::Lifo));
        crawler.run("/wiki/S", &mut CrawlStore::new()).await.unwrap();
        assert_eq!(lifo.calls(), vec!["S", "B", "A", "C"]);
    }

    #[tokio::test]
    async fn failed_fetches_are_skipped() {
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", article("A", Some(&["Missing", "B"]), &[])),
            ("B", article("B", None, &[])),
        ]));
        let mut store = CrawlStore::new();
        let stats = crawl(Arc::clone(&fetcher), config(2, QueueOrder::Fifo), &mut store).await;

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.fetched, 2);
        assert_eq!(store.adjacency()["A"].len(), 2);
        assert!(!store.categories().contains_key("Missing"));
    }

    #[tokio::test]
    async fn resumed_store_is_not_overwritten() {
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", article("A", Some(&["B"]), &["New"])),
            ("B", article("B", None, &[])),
        ]));
        let mut store = CrawlStore::new();
        store.record_categories_if_absent("A", vec!["Old".into()]);
        store.record_adjacency_if_absent("A", vec!["Z".into()]);
        store.record_link_if_absent("A", "https://wiki.test/wiki/A_original");

        let stats = crawl(Arc::clone(&fetcher), config(1, QueueOrder::Fifo), &mut store).await;

        assert_eq!(stats.expanded, 0);
        assert_eq!(store.categories()["A"], vec!["Old".to_string()]);
        assert_eq!(store.adjacency()["A"], vec!["Z".to_string()]);
        assert_eq!(store.title_link()["A"], "https://wiki.test/wiki/A_original");
        // links are still followed even though A was not re-expanded
        assert_eq!(fetcher.calls(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn duplicate_titles_collapse_and_cycles_terminate() {
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", article("A", Some(&["B", "B", "A"]), &[])),
            ("B", article("B", Some(&["A"]), &[])),
        ]));
        let mut store = CrawlStore::new();
        let stats = crawl(Arc::clone(&fetcher), config(5, QueueOrder::Fifo), &mut store).await;

        assert_eq!(stats.fetched, 2);
        assert_eq!(store.adjacency()["A"], vec!["B".to_string(), "A".to_string()]);
        for key in store.adjacency().keys() {
            assert!(store.title_link().contains_key(key));
        }
    }

    #[tokio::test]
    async fn in_page_anchors_are_neither_recorded_nor_followed() {
        let seed = "<html><head><title>A - Wikipedia</title></head><body>\
            <h2>See also</h2><ul><li><a href=\"/wiki/B\">B</a></li>\
            <li><a href=\"#Notes\">Notes</a></li></ul><h2>Notes</h2></body></html>";
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", seed.to_string()),
            ("B", article("B", None, &[])),
        ]));
        let mut store = CrawlStore::new();
        let stats = crawl(Arc::clone(&fetcher), config(2, QueueOrder::Fifo), &mut store).await;

        assert_eq!(store.adjacency()["A"], vec!["B".to_string()]);
        assert!(!store.title_link().contains_key("Notes"));
        assert_eq!(fetcher.calls(), vec!["A", "B"]);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn page_budget_and_concurrency() {
        let fetcher = Arc::new(StaticFetcher::new(vec![
            ("A", article("A", Some(&["B", "C", "D"]), &[])),
            ("B", article("B", None, &[])),
            ("C", article("C", None, &[])),
            ("D", article("D", None, &[])),
        ]));
        let mut cfg = config(2, QueueOrder::Fifo);
        cfg.max_pages = Some(3);
        cfg.concurrency = 4;
        let mut store = CrawlStore::new();
        let stats = crawl(Arc::clone(&fetcher), cfg, &mut store).await;

        assert_eq!(stats.fetched, 3);
        assert_eq!(fetcher.calls().len(), 3);
    }

    #[tokio::test]
    async fn crawler_runs_once() {
        let fetcher = Arc::new(StaticFetcher::new(vec![("A", article("A", None, &[]))]));
        let mut crawler = Crawler::new(fetcher, config(1, QueueOrder::Fifo));
        let mut store = CrawlStore::new();
        crawler.run("/wiki/A", &mut store).await.unwrap();
        assert!(crawler.run("/wiki/A", &mut store).await.is_err());
    }
}
