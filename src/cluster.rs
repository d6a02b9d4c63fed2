use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::ClusterConfig;
use crate::error::PipelineError;
use crate::graph::LinkGraph;

/// Result of k-means over the embedding rows.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Cluster id per node, in node order. Every id in `0..k` is used.
    pub labels: Vec<usize>,
    pub centroids: Array2<f64>,
    pub iterations: usize,
}

impl Clustering {
    pub fn k(&self) -> usize {
        self.centroids.nrows()
    }
}

/// One cluster with its members in node order.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub id: usize,
    pub members: Vec<usize>,
    /// Member nearest to the members' mean point.
    pub representative: usize,
    /// Categories of every member, concatenated; duplicates kept.
    pub categories: Vec<String>,
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Euclidean k-means with k-means++ seeding. Deterministic for a given seed.
pub fn kmeans(points: ArrayView2<'_, f64>, config: &ClusterConfig) -> Result<Clustering, PipelineError> {
    let n = points.nrows();
    let k = config.clusters;
    if k == 0 || k > n {
        return Err(PipelineError::ClusterCount {
            requested: k,
            nodes: n,
        });
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut centroids = kmeans_plusplus_init(points, k, &mut rng);
    let mut labels = vec![usize::MAX; n];

    // at least one assignment pass, so every label is a real cluster id
    let max_iterations = config.max_iterations.max(1);
    let pb = ProgressBar::new(max_iterations as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] k-means {bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut iterations = 0;
    for iteration in 1..=max_iterations {
        iterations = iteration;
        let assigned = assign(points, &centroids);
        let changed = assigned != labels;
        labels = assigned;
        fill_empty_clusters(points, &centroids, &mut labels, k);

        let updated = recompute_centroids(points, &labels, k);
        let shift = centroids
            .axis_iter(Axis(0))
            .zip(updated.axis_iter(Axis(0)))
            .map(|(a, b)| squared_distance(a, b).sqrt())
            .fold(0.0_f64, f64::max);
        centroids = updated;

        pb.inc(1);
        pb.set_message(format!("shift {shift:.2e}"));
        if !changed || shift <= config.tolerance {
            debug!(iteration, shift, "k-means converged");
            break;
        }
    }
    pb.finish_and_clear();

    info!(n, k, iterations, "clustered embedding");
    Ok(Clustering {
        labels,
        centroids,
        iterations,
    })
}

/// First centre uniformly at random, the rest with probability proportional
/// to squared distance from the nearest chosen centre.
fn kmeans_plusplus_init(points: ArrayView2<'_, f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = points.nrows();
    let mut chosen = vec![rng.gen_range(0..n)];
    let mut nearest: Vec<f64> = (0..n)
        .map(|i| squared_distance(points.row(i), points.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = nearest.iter().sum();
        let next = if total > 0.0 {
            let threshold = rng.gen::<f64>() * total;
            let mut cumsum = 0.0;
            nearest
                .iter()
                .position(|d| {
                    cumsum += d;
                    cumsum >= threshold
                })
                .unwrap_or(n - 1)
        } else {
            // every remaining point coincides with a centre
            rng.gen_range(0..n)
        };
        chosen.push(next);
        for (i, d) in nearest.iter_mut().enumerate() {
            *d = d.min(squared_distance(points.row(i), points.row(next)));
        }
    }

    points.select(Axis(0), &chosen)
}

fn assign(points: ArrayView2<'_, f64>, centroids: &Array2<f64>) -> Vec<usize> {
    (0..points.nrows())
        .into_par_iter()
        .map(|i| nearest_centroid(points.row(i), centroids).0)
        .collect()
}

/// Index and squared distance of the closest centroid; lowest index on ties.
fn nearest_centroid(point: ArrayView1<'_, f64>, centroids: &Array2<f64>) -> (usize, f64) {
    centroids
        .axis_iter(Axis(0))
        .map(|c| squared_distance(point, c))
        .enumerate()
        .fold((0, f64::INFINITY), |best, (c, d)| if d < best.1 { (c, d) } else { best })
}

/// Move the point farthest from its centroid into each empty cluster, taking
/// only from clusters that keep at least one member. Always succeeds since k ≤ n.
fn fill_empty_clusters(
    points: ArrayView2<'_, f64>,
    centroids: &Array2<f64>,
    labels: &mut [usize],
    k: usize,
) {
    let mut counts = vec![0usize; k];
    for &l in labels.iter() {
        counts[l] += 1;
    }
    for empty in 0..k {
        if counts[empty] > 0 {
            continue;
        }
        let donor = (0..labels.len())
            .filter(|&i| counts[labels[i]] > 1)
            .map(|i| (i, squared_distance(points.row(i), centroids.row(labels[i]))))
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, bd)) if bd >= d => best,
                _ => Some((i, d)),
            });
        if let Some((i, _)) = donor {
            debug!(cluster = empty, point = i, "reseeding empty cluster");
            counts[labels[i]] -= 1;
            labels[i] = empty;
            counts[empty] = 1;
        }
    }
}

fn recompute_centroids(points: ArrayView2<'_, f64>, labels: &[usize], k: usize) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, points.ncols()));
    let mut counts = vec![0usize; k];
    for (row, &l) in points.axis_iter(Axis(0)).zip(labels) {
        let mut sum = sums.row_mut(l);
        sum += &row;
        counts[l] += 1;
    }
    for (mut sum, &count) in sums.axis_iter_mut(Axis(0)).zip(&counts) {
        if count > 0 {
            sum /= count as f64;
        }
    }
    sums
}

/// Group nodes by label and pick each group's representative.
pub fn build_clusters(
    graph: &LinkGraph,
    embedding: ArrayView2<'_, f64>,
    clustering: &Clustering,
    categories: &IndexMap<String, Vec<String>>,
) -> Vec<Cluster> {
    let mut members: Vec<Vec<usize>> = vec![Vec::new(); clustering.k()];
    for (node, &label) in clustering.labels.iter().enumerate() {
        members[label].push(node);
    }

    members
        .into_iter()
        .enumerate()
        .map(|(id, members)| {
            let rows = embedding.select(Axis(0), &members);
            let mean: Array1<f64> = rows
                .mean_axis(Axis(0))
                .unwrap_or_else(|| Array1::zeros(embedding.ncols()));

            let mut representative = members[0];
            let mut best = f64::INFINITY;
            for (row, &node) in rows.axis_iter(Axis(0)).zip(&members) {
                let d = squared_distance(row, mean.view());
                if d < best {
                    best = d;
                    representative = node;
                }
            }

            let categories = members
                .iter()
                .filter_map(|&node| graph.node(node))
                .flat_map(|title| categories.get(title).into_iter().flatten().cloned())
                .collect();

            Cluster {
                id,
                members,
                representative,
                categories,
            }
        })
        .collect()
}

/// Cluster-level adjacency: for every graph edge (u, v) append both
/// directions between their clusters. Self-edges are kept.
pub fn cluster_graph(graph: &LinkGraph, labels: &[usize], k: usize) -> Vec<Vec<usize>> {
    let mut adjacency = vec![Vec::new(); k];
    for &(u, v) in graph.edges() {
        let (cu, cv) = (labels[u], labels[v]);
        adjacency[cu].push(cv);
        adjacency[cv].push(cu);
    }
    adjacency
}

// ── Tests ──
