//! Run-file serialization: TREC and MSMARCO text formats.
//!
//! The two formats are asymmetric on purpose. TREC carries the score and a
//! run tag; MSMARCO drops the score entirely. Downstream evaluators key off
//! column count, so the asymmetry is preserved exactly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RunFile, ScoredHit};

/// Output style for persisted runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunFormat {
    /// `query_id Q0 doc_id rank score tag`, space-separated.
    #[default]
    Trec,
    /// `query_id\tdoc_id\trank`, score omitted.
    Msmarco,
}

impl fmt::Display for RunFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunFormat::Trec => write!(f, "trec"),
            RunFormat::Msmarco => write!(f, "msmarco"),
        }
    }
}

impl FromStr for RunFormat {
    type Err = FormatError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.to_ascii_lowercase().as_str() {
            "trec" => Ok(RunFormat::Trec),
            "msmarco" => Ok(RunFormat::Msmarco),
            other => Err(FormatError::UnsupportedStyle(other.to_string())),
        }
    }
}

/// Errors from run formatting and reparsing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FormatError {
    /// Unknown output-style label at format-selection time.
    #[error("unsupported run format: {0:?}")]
    UnsupportedStyle(String),
    /// Requested emission depth exceeds the depth the run was produced
    /// with. Truncation is fine; expansion cannot invent hits.
    #[error("requested depth {requested} exceeds run depth {run_k}")]
    InvalidDepth { requested: usize, run_k: usize },
    /// A persisted line did not match the expected column layout.
    #[error("malformed run line {line_no}: {reason}")]
    MalformedLine { line_no: usize, reason: String },
}

/// Serialize a run at its full depth.
pub fn format_run(run: &RunFile, format: RunFormat) -> Result<String, FormatError> {
    format_run_at_depth(run, format, run.k)
}

/// Serialize only the top `depth` hits per query, in rank order.
pub fn format_run_at_depth(
    run: &RunFile,
    format: RunFormat,
    depth: usize,
) -> Result<String, FormatError> {
    if depth > run.k {
        return Err(FormatError::InvalidDepth {
            requested: depth,
            run_k: run.k,
        });
    }

    let mut out = String::new();
    for hit in run.hits() {
        if hit.rank as usize > depth {
            continue;
        }
        match format {
            RunFormat::Trec => {
                out.push_str(&format!(
                    "{} Q0 {} {} {:.6} {}\n",
                    hit.query_id, hit.doc_id, hit.rank, hit.score, run.tag
                ));
            }
            RunFormat::Msmarco => {
                out.push_str(&format!(
                    "{}\t{}\t{}\n",
                    hit.query_id, hit.doc_id, hit.rank
                ));
            }
        }
    }
    Ok(out)
}

/// Reparse persisted run text back into a [`RunFile`].
///
/// (query_id, doc_id, rank) survive both formats exactly. MSMARCO stores no
/// score, so reparsing synthesizes `-(rank)` as a monotone placeholder;
/// rank-based metrics are unaffected.
pub fn parse_run(text: &str, format: RunFormat) -> Result<RunFile, FormatError> {
    let mut run = RunFile::new(0, REPARSED_TAG);
    let mut max_rank = 0usize;

    for (line_no0, line) in text.lines().enumerate() {
        let line_no = line_no0 + 1;
        if line.trim().is_empty() {
            continue;
        }
        let hit = match format {
            RunFormat::Trec => parse_trec_line(line, line_no)?,
            RunFormat::Msmarco => parse_msmarco_line(line, line_no)?,
        };
        max_rank = max_rank.max(hit.rank as usize);
        run.push_hit(hit);
    }

    run.k = max_rank;
    Ok(run)
}

/// Tag applied to reparsed runs; the original tag is recovered from TREC
/// lines only when needed by callers, not here.
const REPARSED_TAG: &str = "reparsed";

fn parse_trec_line(line: &str, line_no: usize) -> Result<ScoredHit, FormatError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(FormatError::MalformedLine {
            line_no,
            reason: format!("expected 6 columns, got {}", fields.len()),
        });
    }
    if fields[1] != "Q0" {
        return Err(FormatError::MalformedLine {
            line_no,
            reason: format!("expected literal Q0, got {:?}", fields[1]),
        });
    }
    let rank = parse_rank(fields[3], line_no)?;
    let score: f32 = fields[4].parse().map_err(|_| FormatError::MalformedLine {
        line_no,
        reason: format!("bad score {:?}", fields[4]),
    })?;
    Ok(ScoredHit {
        query_id: fields[0].to_string(),
        doc_id: fields[2].to_string(),
        rank,
        score,
    })
}

fn parse_msmarco_line(line: &str, line_no: usize) -> Result<ScoredHit, FormatError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 3 {
        return Err(FormatError::MalformedLine {
            line_no,
            reason: format!("expected 3 tab-separated columns, got {}", fields.len()),
        });
    }
    let rank = parse_rank(fields[2], line_no)?;
    Ok(ScoredHit {
        query_id: fields[0].to_string(),
        doc_id: fields[1].to_string(),
        rank,
        score: -(rank as f32),
    })
}

fn parse_rank(field: &str, line_no: usize) -> Result<u32, FormatError> {
    let rank: u32 = field.parse().map_err(|_| FormatError::MalformedLine {
        line_no,
        reason: format!("bad rank {:?}", field),
    })?;
    if rank == 0 {
        return Err(FormatError::MalformedLine {
            line_no,
            reason: "rank must be 1-based".into(),
        });
    }
    Ok(rank)
}
