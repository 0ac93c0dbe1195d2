//! Run data model: queries in, ranked hits out.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// A benchmark query. Immutable once loaded; ids are unique per topic set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Query {
    pub id: String,
    pub text: String,
}

impl Query {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Convert an ordered topic set into queries, consuming each topic's
/// `"title"` field as the query text. Topics without a title are skipped
/// with a warning; topic-set order is preserved.
pub fn queries_from_topics(topics: &[(String, HashMap<String, String>)]) -> Vec<Query> {
    topics
        .iter()
        .filter_map(|(id, fields)| match fields.get("title") {
            Some(title) => Some(Query::new(id.clone(), title.clone())),
            None => {
                log::warn!("topic {id} has no title field, skipping");
                None
            }
        })
        .collect()
}

/// One ranked result: rank is 1-based within its query's hit list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredHit {
    pub query_id: String,
    pub doc_id: String,
    pub rank: u32,
    pub score: f32,
}

/// The ranked output of a retrieval run: hits grouped by query, queries in
/// topic-set order, each group ordered by rank.
#[derive(Debug, Clone, PartialEq)]
pub struct RunFile {
    /// The search depth the run was produced with (per-query hit lists may
    /// be shorter on small corpora).
    pub k: usize,
    /// TREC run tag attached to every formatted line.
    pub tag: String,
    hits: Vec<ScoredHit>,
}

impl RunFile {
    pub fn new(k: usize, tag: impl Into<String>) -> Self {
        Self {
            k,
            tag: tag.into(),
            hits: Vec::new(),
        }
    }

    /// Append one query's ranked hit list. Caller feeds queries in topic
    /// order; hits are assigned 1-based ranks in the order given.
    pub fn push_query_hits<I>(&mut self, query_id: &str, hits: I)
    where
        I: IntoIterator<Item = (String, f32)>,
    {
        for (rank0, (doc_id, score)) in hits.into_iter().enumerate() {
            self.hits.push(ScoredHit {
                query_id: query_id.to_string(),
                doc_id,
                rank: rank0 as u32 + 1,
                score,
            });
        }
    }

    /// Append an already-ranked hit (used when reparsing persisted runs).
    pub fn push_hit(&mut self, hit: ScoredHit) {
        self.hits.push(hit);
    }

    /// All hits, grouped by query in insertion order.
    pub fn hits(&self) -> &[ScoredHit] {
        &self.hits
    }

    /// Distinct query ids in first-appearance order. Reparsed files may
    /// interleave query groups, so each id is reported exactly once.
    pub fn query_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut ids: Vec<&str> = Vec::new();
        for hit in &self.hits {
            if seen.insert(hit.query_id.as_str()) {
                ids.push(&hit.query_id);
            }
        }
        ids
    }

    /// Hits for one query, in rank order.
    pub fn hits_for<'a>(&'a self, query_id: &'a str) -> impl Iterator<Item = &'a ScoredHit> + 'a {
        self.hits.iter().filter(move |h| h.query_id == query_id)
    }
}
