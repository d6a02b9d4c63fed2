//! Cluster naming: the mean word vector of a cluster's category and title words.

use serde::{Serialize, Serializer};

use crate::vectors::EmbeddingLookup;

/// Name vector of one cluster. `Unlabeled` when none of its words are in the
/// vocabulary; serialises as `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum ClusterName {
    Named { vector: Vec<f32>, words_found: usize },
    Unlabeled,
}

impl ClusterName {
    pub fn vector(&self) -> Option<&[f32]> {
        match self {
            Self::Named { vector, .. } => Some(vector),
            Self::Unlabeled => None,
        }
    }

    pub fn words_found(&self) -> usize {
        match self {
            Self::Named { words_found, .. } => *words_found,
            Self::Unlabeled => 0,
        }
    }

    pub fn is_unlabeled(&self) -> bool {
        matches!(self, Self::Unlabeled)
    }
}

impl Serialize for ClusterName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.vector().serialize(serializer)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(str::to_lowercase)
}

/// Lowercased tokens of the cluster's categories, then of its member titles,
/// then of the representative's categories when it has any.
pub fn word_bag<'a>(
    categories: &'a [String],
    titles: impl IntoIterator<Item = &'a str>,
    representative_categories: Option<&'a [String]>,
) -> Vec<String> {
    let mut bag: Vec<String> = categories.iter().flat_map(|c| tokens(c)).collect();
    bag.extend(titles.into_iter().flat_map(tokens));
    if let Some(rep) = representative_categories.filter(|r| !r.is_empty()) {
        bag.extend(rep.iter().flat_map(|c| tokens(c)));
    }
    bag
}

/// Mean of the vectors of the words found in `lookup`. Repeated words count
/// once per occurrence.
pub fn name_cluster(bag: &[String], lookup: &dyn EmbeddingLookup) -> ClusterName {
    let mut sum = vec![0.0_f64; lookup.dimension()];
    let mut words_found = 0;
    for word in bag {
        if let Some(v) = lookup.vector_of(word) {
            for (acc, x) in sum.iter_mut().zip(v) {
                *acc += f64::from(*x);
            }
            words_found += 1;
        }
    }

    if words_found == 0 {
        return ClusterName::Unlabeled;
    }
    let vector = sum
        .into_iter()
        .map(|s| (s / words_found as f64) as f32)
        .collect();
    ClusterName::Named {
        vector,
        words_found,
    }
}

// ── Tests ──
