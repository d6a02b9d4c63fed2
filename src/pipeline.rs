use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cluster::{self, Cluster};
use crate::config::{CrawlConfig, FetchConfig, PipelineConfig};
use crate::crawler::{CrawlStats, Crawler};
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::graph::LinkGraph;
use crate::labeler::{self, ClusterName};
use crate::projector;
use crate::store::{self, CrawlStore};
use crate::vectors::{EmbeddingLookup, WordVectors};

/// Crawl from `seed` over HTTP and persist the three crawl maps.
pub async fn crawl(
    seed: &str,
    config: CrawlConfig,
    fetch: FetchConfig,
    output_dir: &Path,
    resume: bool,
) -> Result<CrawlStats> {
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpFetcher::new(fetch)?);
    crawl_with(fetcher, seed, config, output_dir, resume).await
}

pub async fn crawl_with(
    fetcher: Arc<dyn PageFetcher>,
    seed: &str,
    config: CrawlConfig,
    output_dir: &Path,
    resume: bool,
) -> Result<CrawlStats> {
    let mut store = if resume {
        let store = CrawlStore::load(output_dir)?;
        info!(expanded = store.adjacency().len(), "resuming from stored crawl");
        store
    } else {
        CrawlStore::new()
    };

    let mut crawler = Crawler::new(fetcher, config);
    let stats = crawler.run(seed, &mut store).await?;
    debug!(state = ?crawler.state(), "crawler finished");
    store
        .save(output_dir)
        .with_context(|| format!("saving crawl to {}", output_dir.display()))?;
    Ok(stats)
}

/// Counts reported after the clustering half of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSummary {
    pub nodes: usize,
    pub edges: usize,
    pub clusters: usize,
    pub unlabeled: usize,
    pub kmeans_iterations: usize,
}

#[derive(Serialize)]
struct Manifest<'a> {
    generated_at: DateTime<Utc>,
    config: &'a PipelineConfig,
    summary: &'a ClusterSummary,
    eigenvalues: &'a [f64],
    regularized: bool,
}

/// Load the stored crawl and word vectors, then cluster and write every artifact.
pub fn cluster(config: &PipelineConfig) -> Result<ClusterSummary> {
    let store = CrawlStore::load(&config.output_dir)?;
    let vectors = match &config.vectors {
        Some(path) => Some(WordVectors::load(path)?),
        None => {
            warn!("no word vectors given, every cluster will be unlabeled");
            None
        }
    };
    cluster_with(
        &store,
        config,
        vectors.as_ref().map(|v| v as &dyn EmbeddingLookup),
    )
}

pub fn cluster_with(
    store: &CrawlStore,
    config: &PipelineConfig,
    lookup: Option<&dyn EmbeddingLookup>,
) -> Result<ClusterSummary> {
    let graph = LinkGraph::from_adjacency(store.adjacency());
    info!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built link graph"
    );

    let projection =
        projector::project(&graph, &config.projection).context("spectral projection failed")?;
    let clustering = cluster::kmeans(projection.embedding.view(), &config.cluster)
        .context("clustering failed")?;
    let clusters = cluster::build_clusters(
        &graph,
        projection.embedding.view(),
        &clustering,
        store.categories(),
    );
    let cluster_graph = cluster::cluster_graph(&graph, &clustering.labels, clustering.k());

    let names: Vec<ClusterName> = clusters
        .iter()
        .map(|c| match lookup {
            Some(lookup) => name_of(c, &graph, store.categories(), lookup),
            None => ClusterName::Unlabeled,
        })
        .collect();
    let unlabeled = names.iter().filter(|n| n.is_unlabeled()).count();
    if unlabeled > 0 {
        warn!(unlabeled, "clusters without any known word");
    }

    let answers = related_topics(
        &graph,
        &clusters,
        &clustering.labels,
        &cluster_graph,
        config.answers_per_subject,
    );

    let dir = &config.output_dir;
    store.save(dir)?;
    store::write_json(dir, store::CLUSTER_NAMES_FILE, &keyed(&names))?;
    store::write_json(
        dir,
        store::CLUSTERS_FILE,
        &keyed(
            &clusters
                .iter()
                .map(|c| titles(&graph, &c.members))
                .collect::<Vec<_>>(),
        ),
    )?;
    store::write_json(
        dir,
        store::CLUSTER_CENTERS_FILE,
        &keyed(
            &clusters
                .iter()
                .map(|c| {
                    let title = graph.node(c.representative).unwrap_or_default();
                    (title, store.categories().get(title))
                })
                .collect::<Vec<_>>(),
        ),
    )?;
    store::write_json(dir, store::CLUSTER_GRAPH_FILE, &keyed(&cluster_graph))?;
    store::write_json(dir, store::ANSWERS_FILE, &answers)?;

    let summary = ClusterSummary {
        nodes: graph.node_count(),
        edges: graph.edge_count(),
        clusters: clusters.len(),
        unlabeled,
        kmeans_iterations: clustering.iterations,
    };
    store::write_json(
        dir,
        store::MANIFEST_FILE,
        &Manifest {
            generated_at: Utc::now(),
            config,
            summary: &summary,
            eigenvalues: &projection.eigenvalues,
            regularized: projection.regularized,
        },
    )?;
    info!(dir = %dir.display(), "wrote artifacts");
    Ok(summary)
}

fn keyed<T>(items: &[T]) -> IndexMap<usize, &T> {
    items.iter().enumerate().collect()
}

fn titles<'g>(graph: &'g LinkGraph, nodes: &[usize]) -> Vec<&'g str> {
    nodes.iter().filter_map(|&n| graph.node(n)).collect()
}

fn name_of(
    cluster: &Cluster,
    graph: &LinkGraph,
    categories: &IndexMap<String, Vec<String>>,
    lookup: &dyn EmbeddingLookup,
) -> ClusterName {
    let representative = graph
        .node(cluster.representative)
        .and_then(|title| categories.get(title))
        .map(Vec::as_slice);
    let bag = labeler::word_bag(
        &cluster.categories,
        titles(graph, &cluster.members),
        representative,
    );
    let name = labeler::name_cluster(&bag, lookup);
    debug!(
        cluster = cluster.id,
        words = bag.len(),
        found = name.words_found(),
        "named cluster"
    );
    name
}

/// Per subject: its cluster mates in node order, then the representatives of
/// neighbouring clusters by edge count (most first, ties by id).
fn related_topics(
    graph: &LinkGraph,
    clusters: &[Cluster],
    labels: &[usize],
    cluster_graph: &[Vec<usize>],
    limit: usize,
) -> IndexMap<String, Vec<String>> {
    let neighbours: Vec<Vec<usize>> = cluster_graph
        .iter()
        .enumerate()
        .map(|(id, adjacent)| {
            let mut counts: IndexMap<usize, usize> = IndexMap::new();
            for &other in adjacent.iter().filter(|&&other| other != id) {
                *counts.entry(other).or_insert(0) += 1;
            }
            let mut ranked: Vec<(usize, usize)> = counts.into_iter().collect();
            ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            ranked.into_iter().map(|(other, _)| other).collect()
        })
        .collect();

    graph
        .nodes()
        .enumerate()
        .map(|(node, subject)| {
            let own = labels[node];
            let mates = clusters[own]
                .members
                .iter()
                .filter(|&&m| m != node)
                .filter_map(|&m| graph.node(m));
            let reps = neighbours[own]
                .iter()
                .filter_map(|&c| graph.node(clusters[c].representative));
            let related = mates.chain(reps).take(limit).map(str::to_string).collect();
            (subject.to_string(), related)
        })
        .collect()
}

// ── Tests ──
