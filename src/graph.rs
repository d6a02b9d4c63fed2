use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use ndarray::{Array2, ArrayView2};
use tracing::debug;

/// Undirected multigraph over article titles. Node order is the order in
/// which titles first take part in an edge, and is the row order of every
/// matrix derived from the graph.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    nodes: IndexSet<String>,
    edges: Vec<(usize, usize)>,
}

impl LinkGraph {
    /// One edge per (source, neighbour) entry. Titles that take part in no
    /// edge are left out, so every node has a positive degree.
    pub fn from_adjacency(adjacency: &IndexMap<String, Vec<String>>) -> Self {
        let mut graph = Self::default();
        for (source, neighbours) in adjacency {
            for target in neighbours {
                let (u, _) = graph.nodes.insert_full(source.clone());
                let (v, _) = graph.nodes.insert_full(target.clone());
                graph.edges.push((u, v));
            }
        }

        let isolated = adjacency
            .keys()
            .filter(|k| !graph.nodes.contains(k.as_str()))
            .count();
        if isolated > 0 {
            debug!(isolated, "dropped titles without edges");
        }
        graph
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn node(&self, idx: usize) -> Option<&str> {
        self.nodes.get_index(idx).map(String::as_str)
    }

    #[cfg(test)]
    pub fn index_of(&self, title: &str) -> Option<usize> {
        self.nodes.get_index_of(title)
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    /// Symmetric adjacency matrix; parallel edges add up, a self-loop counts once.
    pub fn adjacency_matrix(&self) -> SparseMatrix {
        let n = self.node_count();
        let mut rows: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
        for &(u, v) in &self.edges {
            *rows[u].entry(v).or_insert(0.0) += 1.0;
            if u != v {
                *rows[v].entry(u).or_insert(0.0) += 1.0;
            }
        }
        SparseMatrix::from_rows(rows)
    }
}

/// Square matrix in compressed sparse row form.
#[derive(Debug, Clone)]
pub struct SparseMatrix {
    n: usize,
    /// Offsets into `targets`/`weights`. Size = n + 1
    offsets: Vec<usize>,
    targets: Vec<usize>,
    weights: Vec<f64>,
}

impl SparseMatrix {
    fn from_rows(rows: Vec<BTreeMap<usize, f64>>) -> Self {
        let n = rows.len();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut targets = Vec::new();
        let mut weights = Vec::new();
        offsets.push(0);
        for row in rows {
            for (j, w) in row {
                targets.push(j);
                weights.push(w);
            }
            offsets.push(targets.len());
        }
        Self {
            n,
            offsets,
            targets,
            weights,
        }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn nnz(&self) -> usize {
        self.targets.len()
    }

    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.offsets[i]..self.offsets[i + 1];
        self.targets[range.clone()]
            .iter()
            .copied()
            .zip(self.weights[range].iter().copied())
    }

    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.row(i).map(|(_, w)| w).sum()).collect()
    }

    /// `diag(left) * self * diag(right)`
    pub fn scaled(&self, left: &[f64], right: &[f64]) -> Self {
        let mut weights = self.weights.clone();
        for i in 0..self.n {
            for k in self.offsets[i]..self.offsets[i + 1] {
                weights[k] *= left[i] * right[self.targets[k]];
            }
        }
        Self {
            weights,
            ..self.clone()
        }
    }

    /// `self * x` for a dense n×p block.
    pub fn mul_dense(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = Array2::zeros((self.n, x.ncols()));
        for i in 0..self.n {
            let mut out_row = out.row_mut(i);
            for (j, w) in self.row(i) {
                out_row.scaled_add(w, &x.row(j));
            }
        }
        out
    }

    #[cfg(test)]
    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n, self.n));
        for i in 0..self.n {
            for (j, w) in self.row(i) {
                dense[[i, j]] = w;
            }
        }
        dense
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn adjacency(entries: &[(&str, &[&str])]) -> IndexMap<String, Vec<String>> {
        entries
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn nodes_follow_first_appearance() {
        let graph = LinkGraph::from_adjacency(&adjacency(&[
            ("A", &["B", "C"]),
            ("C", &["D"]),
            ("Lonely", &[]),
        ]));
        let nodes: Vec<&str> = graph.nodes().collect();
        assert_eq!(nodes, vec!["A", "B", "C", "D"]);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.index_of("Lonely"), None);
        assert_eq!(graph.node(3), Some("D"));
    }

    #[test]
    fn parallel_edges_accumulate() {
        let graph = LinkGraph::from_adjacency(&adjacency(&[("A", &["B"]), ("B", &["A", "B"])]));
        let dense = graph.adjacency_matrix().to_dense();
        assert_eq!(dense, array![[0.0, 2.0], [2.0, 1.0]]);
        assert_eq!(graph.adjacency_matrix().row_sums(), vec![2.0, 3.0]);
    }

    #[test]
    fn sparse_product_matches_dense() {
        let graph = LinkGraph::from_adjacency(&adjacency(&[("A", &["B", "C"]), ("B", &["C"])]));
        let a = graph.adjacency_matrix();
        assert_eq!(a.nnz(), 6);
        let x = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        assert_eq!(a.mul_dense(x.view()), a.to_dense().dot(&x));

        let scaled = a.scaled(&[1.0, 2.0, 3.0], &[1.0, 1.0, 0.5]);
        assert_eq!(scaled.to_dense()[[1, 2]], 2.0 * 0.5);
        assert_eq!(scaled.to_dense()[[2, 0]], 3.0);
    }
}
