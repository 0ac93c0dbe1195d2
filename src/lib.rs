//! Umbrella crate for the drpipe dense-retrieval query pipeline.
//!
//! Stitches the stage crates together so callers can go from a topic set to
//! an evaluated run with a handful of calls: encode queries
//! ([`drp_encoder`]), brute-force search the pre-embedded corpus
//! ([`drp_index`]), assemble and persist the ranked run ([`drp_run`]), and
//! score it against relevance judgments ([`drp_eval`]).

pub mod config;

pub use drp_encoder::{
    codec::{load_cache, save_cache, CacheCodec, CodecError},
    CachedEncoder, Embedding, EncodedQueryCache, EncoderError, ModelEncoder,
    ModelEncoderConfig, ModelFailure, QueryEncoder, RetryConfig, StubModel, TextModel,
};
pub use drp_eval::{
    evaluate, format_metric_line, parse_metric_line, EvalError, Metric, RelevanceJudgments,
};
pub use drp_index::{IndexEntry, IndexError, SearchHit, Similarity, VectorIndex};
pub use drp_run::{
    format_run, format_run_at_depth, parse_run, queries_from_topics, CancelToken,
    FormatError, Query, QueryFailure, RunError, RunFile, RunFormat, RunOutcome,
    RunnerConfig, ScoredHit, SearchRunner,
};

use std::fs;
use std::path::Path;

use thiserror::Error;

/// Errors from any pipeline stage, unified for end-to-end callers.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("encoder failure: {0}")]
    Encoder(#[from] EncoderError),
    #[error("query-cache codec failure: {0}")]
    Codec(#[from] CodecError),
    #[error("index failure: {0}")]
    Index(#[from] IndexError),
    #[error("run failure: {0}")]
    Run(#[from] RunError),
    #[error("run format failure: {0}")]
    Format(#[from] FormatError),
    #[error("evaluation failure: {0}")]
    Eval(#[from] EvalError),
    #[error("config failure: {0}")]
    Config(#[from] config::ConfigLoadError),
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome summary for the surrounding tooling: the pipeline's exit status
/// is success only when every query completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunReport {
    pub fn from_outcome(total_queries: usize, outcome: &RunOutcome) -> Self {
        Self {
            succeeded: total_queries - outcome.failures.len(),
            failed: outcome.failures.len(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Encode and search a topic set, collecting per-query failures.
pub fn execute_run(
    queries: &[Query],
    encoder: &dyn QueryEncoder,
    index: &VectorIndex,
    cfg: RunnerConfig,
    cancel: &CancelToken,
) -> Result<RunOutcome, PipelineError> {
    let runner = SearchRunner::new(cfg)?;
    Ok(runner.run(queries, encoder, index, cancel)?)
}

/// Persist a run to disk in the chosen format.
pub fn write_run_file(
    path: impl AsRef<Path>,
    run: &RunFile,
    format: RunFormat,
) -> Result<(), PipelineError> {
    let text = format_run(run, format)?;
    fs::write(path.as_ref(), text)?;
    log::info!("wrote {format} run to {}", path.as_ref().display());
    Ok(())
}

/// Evaluate a persisted run against judgments. A separate stage from the
/// run itself: its failures are reported independently of run success.
pub fn evaluate_run_file(
    path: impl AsRef<Path>,
    format: RunFormat,
    judgments: &RelevanceJudgments,
    metric: Metric,
) -> Result<f64, PipelineError> {
    let text = fs::read_to_string(path.as_ref())?;
    let run = parse_run(&text, format)?;
    Ok(evaluate(&run, judgments, metric)?)
}
