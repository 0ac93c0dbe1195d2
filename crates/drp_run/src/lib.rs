//! drp_run: batched, parallel retrieval runs over a pre-built vector index.
//!
//! The [`SearchRunner`] encodes a topic set (optionally in batches, across a
//! worker pool), searches each query against the shared read-only
//! [`drp_index::VectorIndex`], and assembles a [`RunFile`] whose ordering
//! always matches the input topic set. [`format`] persists and reparses runs
//! in TREC or MSMARCO text form.

pub mod format;
mod runner;
mod types;

pub use format::{format_run, format_run_at_depth, parse_run, FormatError, RunFormat};
pub use runner::{
    CancelToken, QueryFailure, RunError, RunOutcome, RunnerConfig, SearchRunner,
};
pub use types::{queries_from_topics, Query, RunFile, ScoredHit};
