use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::{info, warn};

use crate::error::PipelineError;

/// Word → fixed-length vector. Callers lowercase words before asking.
pub trait EmbeddingLookup {
    fn vector_of(&self, word: &str) -> Option<&[f32]>;
    fn dimension(&self) -> usize;
}

/// Pretrained word vectors held in one flat buffer.
#[derive(Debug, Default)]
pub struct WordVectors {
    dimension: usize,
    index: HashMap<String, usize>,
    data: Vec<f32>,
}

impl WordVectors {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let file =
            File::open(path).map_err(|e| PipelineError::parse(path.display().to_string(), e))?;
        let vectors = Self::from_reader(BufReader::new(file), &path.display().to_string())?;
        if vectors.is_empty() {
            warn!(path = %path.display(), "word vector file is empty");
        }
        info!(path = %path.display(), words = vectors.len(), dim = vectors.dimension, "loaded word vectors");
        Ok(vectors)
    }

    /// Reads `word v1 .. vd` lines. A leading `count dim` header is accepted.
    /// `source` only labels errors.
    pub fn from_reader(reader: impl BufRead, source: &str) -> Result<Self, PipelineError> {
        let mut vectors = Self::default();

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx + 1;
            let line = line.map_err(|e| PipelineError::parse(source, format!("line {line_no}: {e}")))?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let values: Vec<&str> = fields.collect();

            if line_no == 1 && values.len() == 1 {
                if let (Ok(_), Ok(dim)) = (word.parse::<usize>(), values[0].parse::<usize>()) {
                    vectors.dimension = dim;
                    continue;
                }
            }

            let row = values
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| PipelineError::parse(source, format!("line {line_no}: {e}")))?;

            if vectors.dimension == 0 {
                vectors.dimension = row.len();
            }
            if row.len() != vectors.dimension || row.is_empty() {
                return Err(PipelineError::parse(
                    source,
                    format!(
                        "line {line_no}: expected {} components, found {}",
                        vectors.dimension,
                        row.len()
                    ),
                ));
            }

            // keep the first vector for repeated words
            if !vectors.index.contains_key(word) {
                vectors.index.insert(word.to_string(), vectors.index.len());
                vectors.data.extend_from_slice(&row);
            }
        }

        Ok(vectors)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

impl EmbeddingLookup for WordVectors {
    fn vector_of(&self, word: &str) -> Option<&[f32]> {
        let row = *self.index.get(word)?;
        let start = row * self.dimension;
        self.data.get(start..start + self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
