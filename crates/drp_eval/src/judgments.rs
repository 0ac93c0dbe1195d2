//! Binary relevance judgments loaded from TREC qrels text.

use std::fs;
use std::path::Path;

use hashbrown::{HashMap, HashSet};

use crate::EvalError;

/// Mapping from query_id to the set of judged-relevant doc_ids.
#[derive(Debug, Clone, Default)]
pub struct RelevanceJudgments {
    relevant: HashMap<String, HashSet<String>>,
}

impl RelevanceJudgments {
    /// Build from (query_id, relevant doc_id) pairs.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut relevant: HashMap<String, HashSet<String>> = HashMap::new();
        for (query_id, doc_id) in pairs {
            relevant.entry(query_id).or_default().insert(doc_id);
        }
        Self { relevant }
    }

    /// Parse TREC qrels text: `query_id 0 doc_id relevance` per line,
    /// whitespace-separated. A positive relevance grade marks the doc
    /// relevant; grade-zero lines record a judged-nonrelevant doc and add
    /// the query with no relevant docs. Malformed lines are errors.
    pub fn from_trec_text(text: &str) -> Result<Self, EvalError> {
        let mut relevant: HashMap<String, HashSet<String>> = HashMap::new();
        for (line_no0, line) in text.lines().enumerate() {
            let line_no = line_no0 + 1;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(EvalError::MalformedJudgments {
                    line_no,
                    reason: format!("expected 4 columns, got {}", fields.len()),
                });
            }
            let grade: i32 =
                fields[3]
                    .parse()
                    .map_err(|_| EvalError::MalformedJudgments {
                        line_no,
                        reason: format!("bad relevance grade {:?}", fields[3]),
                    })?;

            let entry = relevant.entry(fields[0].to_string()).or_default();
            if grade > 0 {
                entry.insert(fields[2].to_string());
            }
        }
        Ok(Self { relevant })
    }

    /// Load a qrels file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EvalError> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            EvalError::MalformedJudgments {
                line_no: 0,
                reason: format!("cannot read {}: {e}", path.as_ref().display()),
            }
        })?;
        let judgments = Self::from_trec_text(&text)?;
        log::info!(
            "loaded judgments for {} queries from {}",
            judgments.len(),
            path.as_ref().display()
        );
        Ok(judgments)
    }

    /// Relevant docs for a query; `None` when the query was never judged.
    pub fn relevant_docs(&self, query_id: &str) -> Option<&HashSet<String>> {
        self.relevant.get(query_id)
    }

    pub fn is_relevant(&self, query_id: &str, doc_id: &str) -> bool {
        self.relevant
            .get(query_id)
            .is_some_and(|docs| docs.contains(doc_id))
    }

    /// Number of judged queries (including all-nonrelevant ones).
    pub fn len(&self) -> usize {
        self.relevant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relevant.is_empty()
    }
}
