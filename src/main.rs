mod cluster;
mod config;
mod crawler;
mod error;
mod fetcher;
mod graph;
mod labeler;
mod parser;
mod pipeline;
mod projector;
mod store;
mod vectors;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use url::Url;

use config::{
    ClusterConfig, CrawlConfig, FetchConfig, PipelineConfig, ProjectionConfig, QueueOrder,
    DEFAULT_BASE_URL, DEFAULT_CLUSTERS, DEFAULT_DEPTH, DEFAULT_DIMENSION, DEFAULT_REGULARIZATION,
    DEFAULT_SEED,
};

#[derive(Parser)]
#[command(name = "seealso_atlas", about = "Cluster Wikipedia topics by their \"See also\" links")]
struct Cli {
    /// Directory holding crawl maps and cluster artifacts
    #[arg(short, long, global = true, env = "SEEALSO_OUTPUT", default_value = "data")]
    output: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl "See also" links from a seed article
    Crawl {
        #[command(flatten)]
        crawl: CrawlArgs,
    },
    /// Project, cluster and name the stored crawl
    Cluster {
        #[command(flatten)]
        cluster: ClusterArgs,
    },
    /// Crawl then cluster in one go
    Run {
        #[command(flatten)]
        crawl: CrawlArgs,
        #[command(flatten)]
        cluster: ClusterArgs,
    },
    /// Show counts from stored artifacts
    Stats,
    /// Print the related topics stored for a subject
    Lookup {
        /// Article title, e.g. "Graph theory"
        subject: String,
    },
}

#[derive(Args)]
struct CrawlArgs {
    /// Seed article path or URL, e.g. /wiki/Graph_theory
    seed: String,
    /// Origin relative links resolve against
    #[arg(long, env = "SEEALSO_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base: Url,
    /// Maximum link depth from the seed
    #[arg(short, long, env = "SEEALSO_DEPTH", default_value_t = DEFAULT_DEPTH)]
    depth: usize,
    /// Stop after this many fetches (default: no limit)
    #[arg(short = 'n', long, env = "SEEALSO_MAX_PAGES")]
    max_pages: Option<usize>,
    /// Parallel fetches
    #[arg(short, long, env = "SEEALSO_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,
    #[arg(long, env = "SEEALSO_ORDER", value_enum, default_value_t = QueueOrder::Fifo)]
    order: QueueOrder,
    /// Retries on HTTP 429/5xx
    #[arg(long, env = "SEEALSO_RETRIES", default_value_t = 3)]
    retries: u32,
    /// First retry delay, doubled on every further attempt
    #[arg(long, env = "SEEALSO_BACKOFF_MS", default_value_t = 2000)]
    backoff_ms: u64,
    /// Keep previously stored maps and add to them
    #[arg(long)]
    resume: bool,
}

impl CrawlArgs {
    fn configs(&self) -> (CrawlConfig, FetchConfig) {
        let mut crawl = CrawlConfig::new(self.base.clone(), self.depth);
        crawl.max_pages = self.max_pages;
        crawl.concurrency = self.concurrency;
        crawl.order = self.order;
        let fetch = FetchConfig {
            max_retries: self.retries,
            base_backoff: Duration::from_millis(self.backoff_ms),
            ..FetchConfig::default()
        };
        (crawl, fetch)
    }
}

#[derive(Args)]
struct ClusterArgs {
    /// GloVe/word2vec text file used to name clusters
    #[arg(long, env = "SEEALSO_VECTORS")]
    vectors: Option<PathBuf>,
    /// Embedding dimension d
    #[arg(long, env = "SEEALSO_DIMENSION", default_value_t = DEFAULT_DIMENSION)]
    dimension: usize,
    /// Cluster count K
    #[arg(short = 'k', long, env = "SEEALSO_CLUSTERS", default_value_t = DEFAULT_CLUSTERS)]
    clusters: usize,
    #[arg(long, env = "SEEALSO_SEED", default_value_t = DEFAULT_SEED)]
    seed: u64,
    #[arg(long, env = "SEEALSO_KMEANS_ITERS", default_value_t = 300)]
    kmeans_iters: usize,
    #[arg(long, env = "SEEALSO_EIGEN_TOL", default_value_t = 1e-6)]
    eigen_tol: f64,
    #[arg(long, env = "SEEALSO_EIGEN_ITERS", default_value_t = 1000)]
    eigen_iters: usize,
    /// Identity shift for the eigensolver retry
    #[arg(long, env = "SEEALSO_REGULARIZATION", default_value_t = DEFAULT_REGULARIZATION)]
    regularization: f64,
}

impl ClusterArgs {
    fn config(&self, output: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::new(output.to_path_buf());
        config.vectors = self.vectors.clone();
        config.projection = ProjectionConfig {
            dimension: self.dimension,
            tolerance: self.eigen_tol,
            max_iterations: self.eigen_iters,
            regularization: self.regularization,
            seed: self.seed,
        };
        config.cluster = ClusterConfig {
            clusters: self.clusters,
            max_iterations: self.kmeans_iters,
            seed: self.seed,
            ..ClusterConfig::default()
        };
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let output = cli.output;

    let result = match cli.command {
        Commands::Crawl { crawl } => run_crawl(&crawl, &output).await,
        Commands::Cluster { cluster } => run_cluster(&cluster, &output),
        Commands::Run { crawl, cluster } => {
            let t_crawl = Instant::now();
            run_crawl(&crawl, &output).await?;
            println!("Crawled in {}", format_duration(t_crawl.elapsed()));

            let t_cluster = Instant::now();
            run_cluster(&cluster, &output)?;
            println!("Clustered in {}", format_duration(t_cluster.elapsed()));
            Ok(())
        }
        Commands::Stats => {
            let s = store::get_stats(&output)?;
            println!("Expanded:    {}", s.expanded);
            println!("Titles:      {}", s.titles);
            println!("Categorised: {}", s.categorised);
            println!("Edges:       {}", s.edges);
            match (s.clusters, s.unlabeled) {
                (Some(clusters), Some(unlabeled)) => {
                    println!("Clusters:    {}", clusters);
                    println!("Unlabeled:   {}", unlabeled);
                }
                _ => println!("Clusters:    - (run 'cluster' first)"),
            }
            Ok(())
        }
        Commands::Lookup { subject } => {
            let related = store::lookup(&output, &subject)
                .context("no answers stored; run 'cluster' first")?
                .ok_or_else(|| anyhow!("unknown subject: {subject}"))?;
            println!("{}", subject);
            for (i, title) in related.iter().enumerate() {
                println!("{:>3}. {}", i + 1, truncate(title, 60));
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run_crawl(args: &CrawlArgs, output: &Path) -> anyhow::Result<()> {
    let (crawl, fetch) = args.configs();
    println!("Crawling from {} (depth {})...", args.seed, args.depth);
    let stats = pipeline::crawl(&args.seed, crawl, fetch, output, args.resume).await?;
    println!(
        "Done: {} fetched ({} failed), {} expanded, {} enqueued.",
        stats.fetched, stats.failed, stats.expanded, stats.enqueued
    );
    Ok(())
}

fn run_cluster(args: &ClusterArgs, output: &Path) -> anyhow::Result<()> {
    let config = args.config(output);
    println!(
        "Clustering into K={} with d={}...",
        config.cluster.clusters, config.projection.dimension
    );
    let summary = pipeline::cluster(&config)?;
    println!(
        "Saved {} clusters over {} nodes ({} edges, {} unlabeled) to {}.",
        summary.clusters,
        summary.nodes,
        summary.edges,
        summary.unlabeled,
        output.display()
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
