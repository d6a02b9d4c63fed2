use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://en.wikipedia.org/";
pub const DEFAULT_DEPTH: usize = 3;
pub const DEFAULT_DIMENSION: usize = 50;
pub const DEFAULT_CLUSTERS: usize = 1000;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_REGULARIZATION: f64 = 1e-8;

/// Order in which the crawl frontier is drained.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOrder {
    /// Breadth-first: oldest discovery first.
    #[default]
    Fifo,
    /// Newest discovery first; reproduces front-insertion crawls.
    Lifo,
}

#[derive(Clone, Debug, Serialize)]
pub struct CrawlConfig {
    pub base: Url,
    pub max_depth: usize,
    /// Stop dequeuing after this many fetches.
    pub max_pages: Option<usize>,
    pub concurrency: usize,
    pub order: QueueOrder,
}

impl CrawlConfig {
    pub fn new(base: Url, max_depth: usize) -> Self {
        Self {
            base,
            max_depth,
            max_pages: None,
            concurrency: 1,
            order: QueueOrder::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct FetchConfig {
    pub max_retries: u32,
    #[serde(skip)]
    pub base_backoff: Duration,
    #[serde(skip)]
    pub timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_backoff: Duration::from_millis(2000),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProjectionConfig {
    pub dimension: usize,
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Multiple of the identity added to the operator on the retry.
    pub regularization: f64,
    pub seed: u64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            tolerance: 1e-6,
            max_iterations: 1000,
            regularization: DEFAULT_REGULARIZATION,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ClusterConfig {
    pub clusters: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            clusters: DEFAULT_CLUSTERS,
            max_iterations: 300,
            tolerance: 1e-4,
            seed: DEFAULT_SEED,
        }
    }
}

/// Everything the clustering half of the pipeline needs.
#[derive(Clone, Debug, Serialize)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub vectors: Option<PathBuf>,
    pub projection: ProjectionConfig,
    pub cluster: ClusterConfig,
    pub answers_per_subject: usize,
}

impl PipelineConfig {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            vectors: None,
            projection: ProjectionConfig::default(),
            cluster: ClusterConfig::default(),
            answers_per_subject: 10,
        }
    }
}
