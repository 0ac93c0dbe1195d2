//! Brute-force top-k selection over the stored corpus vectors.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rayon::prelude::*;

use crate::{IndexError, VectorIndex};

/// A ranked search result for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub doc_id: String,
    pub score: f32,
}

/// Min-heap entry: the heap root is the current worst hit, so pushing and
/// popping at capacity k keeps exactly the k best.
#[derive(Debug, Clone)]
struct ScoredEntry {
    score: f32,
    doc_id: String,
}

impl PartialEq for ScoredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.doc_id == other.doc_id
    }
}

impl Eq for ScoredEntry {}

impl PartialOrd for ScoredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed score so the heap evicts the lowest score first; on score
        // ties the lexicographically larger doc_id is evicted first, which
        // keeps the final ascending-doc_id tie-break stable.
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.doc_id.cmp(&other.doc_id))
    }
}

/// Sequential scans switch to rayon chunked scans above this corpus size.
const PARALLEL_THRESHOLD: usize = 8_192;
const PARALLEL_CHUNK: usize = 1_024;

impl VectorIndex {
    /// Exact top-k search: score `query` against every stored vector and
    /// return at most `k` hits ordered by descending score, ties broken by
    /// ascending doc_id.
    ///
    /// An empty index yields an empty result. `k == 0` and a query width
    /// that differs from the index dimension are caller errors.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>, IndexError> {
        if k == 0 {
            return Err(IndexError::InvalidK(k));
        }
        let Some(dimension) = self.dimension() else {
            return Ok(Vec::new());
        };
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let heap = if self.len() >= PARALLEL_THRESHOLD {
            self.scan_parallel(query, k)
        } else {
            self.scan_sequential(query, k)
        };

        let mut hits: Vec<SearchHit> = heap
            .into_iter()
            .map(|entry| SearchHit {
                doc_id: entry.doc_id,
                score: entry.score,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        log::debug!("search returned {} of {} entries (k={k})", hits.len(), self.len());
        Ok(hits)
    }

    fn scan_sequential(&self, query: &[f32], k: usize) -> BinaryHeap<ScoredEntry> {
        let similarity = self.similarity();
        let mut heap = BinaryHeap::with_capacity(k + 1);
        for entry in self.entries() {
            heap.push(ScoredEntry {
                score: similarity.score(query, &entry.vector),
                doc_id: entry.doc_id.clone(),
            });
            if heap.len() > k {
                heap.pop();
            }
        }
        heap
    }

    fn scan_parallel(&self, query: &[f32], k: usize) -> BinaryHeap<ScoredEntry> {
        let similarity = self.similarity();
        let partials: Vec<Vec<ScoredEntry>> = self
            .entries()
            .par_chunks(PARALLEL_CHUNK)
            .map(|chunk| {
                let mut local = BinaryHeap::with_capacity(k + 1);
                for entry in chunk {
                    local.push(ScoredEntry {
                        score: similarity.score(query, &entry.vector),
                        doc_id: entry.doc_id.clone(),
                    });
                    if local.len() > k {
                        local.pop();
                    }
                }
                local.into_vec()
            })
            .collect();

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for partial in partials {
            for entry in partial {
                heap.push(entry);
                if heap.len() > k {
                    heap.pop();
                }
            }
        }
        heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IndexEntry, Similarity};

    fn seed_index(entries: Vec<(&str, Vec<f32>)>) -> VectorIndex {
        let entries = entries
            .into_iter()
            .map(|(doc_id, vector)| IndexEntry::new(doc_id, vector))
            .collect();
        VectorIndex::build(entries, Similarity::InnerProduct).expect("seed index")
    }

    #[test]
    fn search_orders_by_score_descending() {
        let index = seed_index(vec![
            ("doc-c", vec![0.1, 0.0]),
            ("doc-a", vec![0.9, 0.0]),
            ("doc-b", vec![0.5, 0.0]),
        ]);

        let hits = index.search(&[1.0, 0.0], 10).expect("search");
        let ids: Vec<&str> = hits.iter().map(|h| h.doc_id.as_str()).collect();
        assert_eq!(ids, ["doc-a", "doc-b", "doc-c"]);
        assert!(hits[0].score > hits[1].score && hits[1].score > hits[2].score);
    }

    #[test]
    fn ties_break_by_ascending_doc_id() {
        let index = seed_index(vec![
            ("doc-b", vec![1.0, 0.0]),
            ("doc-a", vec![1.0, 0.0]),
            ("doc-c", vec![1.0, 0.0]),
        ]);

        let hits = index.search(&[1.0, 0.0], 2).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "doc-a");
        assert_eq!(hits[1].doc_id, "doc-b");
    }

    #[test]
    fn returns_at_most_k_hits() {
        let index = seed_index(vec![
            ("doc-a", vec![3.0]),
            ("doc-b", vec![2.0]),
            ("doc-c", vec![1.0]),
        ]);
        let hits = index.search(&[1.0], 2).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].doc_id, "doc-a");
    }

    #[test]
    fn zero_k_is_a_caller_error() {
        let index = seed_index(vec![("doc-a", vec![1.0])]);
        assert!(matches!(
            index.search(&[1.0], 0),
            Err(IndexError::InvalidK(0))
        ));
    }

    #[test]
    fn dimension_mismatch_never_returns_hits() {
        let index = seed_index(vec![("doc-a", vec![1.0, 0.0])]);
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 5),
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn empty_index_returns_empty_result() {
        let index = VectorIndex::build(Vec::new(), Similarity::InnerProduct)
            .expect("empty index");
        let hits = index.search(&[1.0, 2.0], 5).expect("search on empty index");
        assert!(hits.is_empty());
    }

    #[test]
    fn parallel_scan_matches_sequential_scan() {
        // Enough entries to cross the parallel threshold; scores are unique
        // by construction so ordering is fully determined.
        let entries: Vec<IndexEntry> = (0..PARALLEL_THRESHOLD + 100)
            .map(|i| IndexEntry::new(format!("doc-{i:06}"), vec![i as f32, 1.0]))
            .collect();
        let index =
            VectorIndex::build(entries, Similarity::InnerProduct).expect("large index");

        let query = [1.0_f32, 0.0];
        let parallel = index.search(&query, 7).expect("parallel search");
        let sequential = index.scan_sequential(&query, 7);

        let mut expected: Vec<SearchHit> = sequential
            .into_iter()
            .map(|e| SearchHit {
                doc_id: e.doc_id,
                score: e.score,
            })
            .collect();
        expected.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        assert_eq!(parallel, expected);
    }
}
