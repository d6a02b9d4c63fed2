use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const ADJACENCY_FILE: &str = "adjacency.json";
pub const TITLE_LINK_FILE: &str = "title_link.json";
pub const CATEGORIES_FILE: &str = "categories.json";
pub const CLUSTER_NAMES_FILE: &str = "cluster_names.json";
pub const CLUSTERS_FILE: &str = "clusters.json";
pub const CLUSTER_CENTERS_FILE: &str = "cluster_centers.json";
pub const CLUSTER_GRAPH_FILE: &str = "cluster_graph.json";
pub const ANSWERS_FILE: &str = "answers.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// The three maps a crawl accumulates. Every entry is write-once: later
/// observations of a key are ignored.
#[derive(Debug, Default, Clone)]
pub struct CrawlStore {
    adjacency: IndexMap<String, Vec<String>>,
    title_link: IndexMap<String, String>,
    categories: IndexMap<String, Vec<String>>,
}

impl CrawlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `title` was already expanded.
    pub fn record_adjacency_if_absent(&mut self, title: &str, neighbours: Vec<String>) -> bool {
        record_if_absent(&mut self.adjacency, title, neighbours)
    }

    pub fn record_link_if_absent(&mut self, title: &str, url: &str) -> bool {
        record_if_absent(&mut self.title_link, title, url.to_string())
    }

    pub fn record_categories_if_absent(&mut self, title: &str, categories: Vec<String>) -> bool {
        record_if_absent(&mut self.categories, title, categories)
    }

    pub fn is_expanded(&self, title: &str) -> bool {
        self.adjacency.contains_key(title)
    }

    pub fn adjacency(&self) -> &IndexMap<String, Vec<String>> {
        &self.adjacency
    }

    pub fn title_link(&self) -> &IndexMap<String, String> {
        &self.title_link
    }

    pub fn categories(&self) -> &IndexMap<String, Vec<String>> {
        &self.categories
    }

    /// Load whatever maps exist under `dir`; missing files start empty.
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            adjacency: read_json_or_default(&dir.join(ADJACENCY_FILE))?,
            title_link: read_json_or_default(&dir.join(TITLE_LINK_FILE))?,
            categories: read_json_or_default(&dir.join(CATEGORIES_FILE))?,
        })
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        write_json(dir, ADJACENCY_FILE, &self.adjacency)?;
        write_json(dir, TITLE_LINK_FILE, &self.title_link)?;
        write_json(dir, CATEGORIES_FILE, &self.categories)?;
        Ok(())
    }
}

fn record_if_absent<V>(map: &mut IndexMap<String, V>, key: &str, value: V) -> bool {
    if map.contains_key(key) {
        return false;
    }
    map.insert(key.to_string(), value);
    true
}

/// Serialize `value` as pretty JSON to `dir/name`, creating `dir` if needed.
pub fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(name);
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if path.exists() {
        read_json(path)
    } else {
        Ok(T::default())
    }
}

/// Precomputed related-topic list for `subject`, or `None` if unknown.
pub fn lookup(dir: &Path, subject: &str) -> Result<Option<Vec<String>>> {
    let mut answers: IndexMap<String, Vec<String>> = read_json(&dir.join(ANSWERS_FILE))?;
    Ok(answers.swap_remove(subject))
}

pub struct Stats {
    pub expanded: usize,
    pub titles: usize,
    pub categorised: usize,
    pub edges: usize,
    pub clusters: Option<usize>,
    pub unlabeled: Option<usize>,
}

pub fn get_stats(dir: &Path) -> Result<Stats> {
    let store = CrawlStore::load(dir)?;
    let edges = store.adjacency().values().map(Vec::len).sum();

    let names_path = dir.join(CLUSTER_NAMES_FILE);
    let (clusters, unlabeled) = if names_path.exists() {
        let names: IndexMap<String, Option<Vec<f32>>> = read_json(&names_path)?;
        let unlabeled = names.values().filter(|v| v.is_none()).count();
        (Some(names.len()), Some(unlabeled))
    } else {
        (None, None)
    };

    Ok(Stats {
        expanded: store.adjacency().len(),
        titles: store.title_link().len(),
        categorised: store.categories().len(),
        edges,
        clusters,
        unlabeled,
    })
}

// ── Tests ──
