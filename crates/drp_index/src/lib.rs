//! drp_index: exact nearest-neighbor search over pre-embedded passages.
//!
//! Holds every corpus vector in memory and answers top-k queries by scoring
//! the query against all of them (brute-force, no approximation structure).
//! Selection uses a bounded min-heap so a search costs O(N log k) rather
//! than a full sort, and large corpora are scanned in parallel chunks.

mod search;

pub use search::SearchHit;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single passage vector as stored in the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    /// Stable passage identifier, unique within the corpus.
    pub doc_id: String,
    /// Passage embedding; every entry in one index must share a dimension.
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn new(doc_id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            doc_id: doc_id.into(),
            vector,
        }
    }
}

/// Similarity function applied between a query vector and stored vectors.
///
/// This must match the metric the encoder/index pair was trained with. The
/// index cannot detect a mismatch: scoring a dot-product-trained corpus with
/// cosine (or vice versa) produces plausible-looking but wrong rankings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// Raw inner product. The right choice for dot-product-trained encoders.
    #[default]
    InnerProduct,
    /// Inner product over L2-normalized magnitudes.
    Cosine,
}

impl Similarity {
    #[inline]
    pub(crate) fn score(&self, query: &[f32], stored: &[f32]) -> f32 {
        let dot: f32 = query.iter().zip(stored).map(|(q, s)| q * s).sum();
        match self {
            Similarity::InnerProduct => dot,
            Similarity::Cosine => {
                let norm_q = query.iter().map(|v| v * v).sum::<f32>().sqrt();
                let norm_s = stored.iter().map(|v| v * v).sum::<f32>().sqrt();
                if norm_q == 0.0 || norm_s == 0.0 {
                    0.0
                } else {
                    dot / (norm_q * norm_s)
                }
            }
        }
    }
}

/// Errors surfaced by index construction and search.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IndexError {
    /// Query or entry vector width differs from the index dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// `k` must be at least 1; a zero cutoff is a caller bug, not an empty result.
    #[error("invalid k: {0} (must be >= 1)")]
    InvalidK(usize),
    /// An entry carried an empty vector.
    #[error("empty vector for doc '{0}'")]
    EmptyVector(String),
}

/// Immutable brute-force vector index.
///
/// The entry collection is fixed at [`build`](Self::build) time; there are no
/// live inserts, so searches share the index freely across threads without
/// locking.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: Option<usize>,
    similarity: Similarity,
}

impl VectorIndex {
    /// Build an index from passage entries, validating a uniform dimension.
    pub fn build(
        entries: Vec<IndexEntry>,
        similarity: Similarity,
    ) -> Result<Self, IndexError> {
        let mut dimension = None;
        for entry in &entries {
            if entry.vector.is_empty() {
                return Err(IndexError::EmptyVector(entry.doc_id.clone()));
            }
            match dimension {
                None => dimension = Some(entry.vector.len()),
                Some(expected) if expected != entry.vector.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        actual: entry.vector.len(),
                    });
                }
                Some(_) => {}
            }
        }

        log::info!(
            "built vector index: {} entries, dimension {:?}, similarity {:?}",
            entries.len(),
            dimension,
            similarity
        );

        Ok(Self {
            entries,
            dimension,
            similarity,
        })
    }

    /// Number of passages in the index.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding width shared by all entries; `None` for an empty index.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    pub(crate) fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Whether a doc_id is present in the index. Linear scan; test helper
    /// and audit tooling only, not a search-path operation.
    pub fn contains(&self, doc_id: &str) -> bool {
        self.entries.iter().any(|e| e.doc_id == doc_id)
    }
}
