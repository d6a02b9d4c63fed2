use thiserror::Error;

/// Failures raised by the crawl and clustering stages.
///
/// `Fetch` and `Parse` are per-node: the crawler logs them and moves on.
/// The numerical variants abort their stage and carry the parameters that
/// caused them so the operator can adjust `d` or `K`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("malformed page {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("embedding dimension d={requested} must be positive and below the node count n={nodes}")]
    Dimension { requested: usize, nodes: usize },

    #[error(
        "eigensolver did not converge for n={nodes}, d={dimension} after {iterations} iterations (regularized retry included)"
    )]
    EigenConvergence {
        nodes: usize,
        dimension: usize,
        iterations: usize,
    },

    #[error("cluster count K={requested} must be positive and at most the node count n={nodes}")]
    ClusterCount { requested: usize, nodes: usize },
}

impl PipelineError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Parse {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Per-node errors never abort a crawl.
    pub fn is_node_local(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Parse { .. })
    }
}
