//! drp_eval: score a retrieval run against relevance judgments.
//!
//! Judgments are binary (a doc is relevant to a query or it is not), loaded
//! from TREC qrels text. The headline metric is MRR@10; the same machinery
//! scores recall at a cutoff. Evaluation reads only (query_id, doc_id, rank),
//! so a freshly produced run and its formatted-then-reparsed twin score
//! identically.

mod judgments;

pub use judgments::RelevanceJudgments;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drp_run::RunFile;

/// Ranking metric selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum Metric {
    /// Mean Reciprocal Rank over the first `cutoff` ranks.
    Mrr { cutoff: usize },
    /// Fraction of a query's relevant docs found in the first `cutoff` ranks.
    Recall { cutoff: usize },
}

impl Metric {
    /// MRR@10, the MS MARCO passage-dev headline metric.
    pub const MRR_AT_10: Metric = Metric::Mrr { cutoff: 10 };

    /// The fixed label collaborators grep evaluation output for.
    pub fn label(&self) -> String {
        match self {
            Metric::Mrr { cutoff } => format!("MRR @{cutoff}"),
            Metric::Recall { cutoff } => format!("Recall @{cutoff}"),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Errors surfaced by evaluation. Structural problems are reported, never
/// silently skipped; a partial or skewed average is worse than a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// No query in the run has any relevant judgment, so the metric's
    /// denominator would be empty.
    #[error("no run query has relevance judgments")]
    MissingJudgments,
    /// The run's rank structure is inconsistent.
    #[error("malformed run: {0}")]
    MalformedRun(String),
    /// A qrels line did not parse.
    #[error("malformed judgments at line {line_no}: {reason}")]
    MalformedJudgments { line_no: usize, reason: String },
    /// Cutoffs must be at least 1.
    #[error("invalid metric cutoff: {0}")]
    InvalidCutoff(usize),
}

/// Score `run` against `judgments` with the chosen metric.
///
/// The mean runs over queries that have at least one relevant judgment;
/// unjudged queries are excluded from the denominator (the standard IR
/// convention — counting them as zero silently deflates the score).
/// Accumulation is in f64 over the run's query order, so repeated
/// evaluation of the same inputs is bit-identical.
pub fn evaluate(
    run: &RunFile,
    judgments: &RelevanceJudgments,
    metric: Metric,
) -> Result<f64, EvalError> {
    let cutoff = match metric {
        Metric::Mrr { cutoff } | Metric::Recall { cutoff } => cutoff,
    };
    if cutoff == 0 {
        return Err(EvalError::InvalidCutoff(cutoff));
    }
    validate_run(run)?;

    let mut total = 0.0_f64;
    let mut judged_queries = 0usize;

    for query_id in run.query_ids() {
        let Some(relevant) = judgments.relevant_docs(query_id) else {
            continue;
        };
        if relevant.is_empty() {
            continue;
        }
        judged_queries += 1;

        match metric {
            Metric::Mrr { cutoff } => {
                let first_hit = run
                    .hits_for(query_id)
                    .filter(|hit| hit.rank as usize <= cutoff)
                    .find(|hit| relevant.contains(hit.doc_id.as_str()));
                if let Some(hit) = first_hit {
                    total += 1.0 / hit.rank as f64;
                }
            }
            Metric::Recall { cutoff } => {
                let found = run
                    .hits_for(query_id)
                    .filter(|hit| hit.rank as usize <= cutoff)
                    .filter(|hit| relevant.contains(hit.doc_id.as_str()))
                    .count();
                total += found as f64 / relevant.len() as f64;
            }
        }
    }

    if judged_queries == 0 {
        return Err(EvalError::MissingJudgments);
    }

    let score = total / judged_queries as f64;
    log::info!(
        "{} = {score} over {judged_queries} judged queries",
        metric.label()
    );
    Ok(score)
}

/// Ranks within each query must start at 1 and increase by exactly 1.
fn validate_run(run: &RunFile) -> Result<(), EvalError> {
    for query_id in run.query_ids() {
        let mut expected = 1u32;
        for hit in run.hits_for(query_id) {
            if hit.rank != expected {
                return Err(EvalError::MalformedRun(format!(
                    "query {query_id}: expected rank {expected}, found {}",
                    hit.rank
                )));
            }
            expected += 1;
        }
    }
    Ok(())
}

/// Render the boundary-contract output line: the fixed metric label, then
/// the score as the last numeric token.
pub fn format_metric_line(metric: Metric, score: f64) -> String {
    format!("{}: {score:.5}", metric.label())
}

/// Scan tool output for `label` and parse the trailing float on that line —
/// the documented contract for collaborators consuming evaluation output.
pub fn parse_metric_line(output: &str, label: &str) -> Option<f64> {
    output
        .lines()
        .find(|line| line.contains(label))
        .and_then(|line| line.split_whitespace().last())
        .and_then(|token| token.parse().ok())
}
