//! Batched, parallel orchestration of encode + search over a topic set.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drp_encoder::{Embedding, EncoderError, QueryEncoder};
use drp_index::{SearchHit, VectorIndex};

use crate::types::{Query, RunFile};

/// Run-level knobs. Batch size and parallelism are injected configuration;
/// resolving them from the environment is the caller's concern.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Search depth per query.
    #[serde(default = "RunnerConfig::default_k")]
    pub k: usize,
    /// Queries encoded per model invocation.
    #[serde(default = "RunnerConfig::default_batch_size")]
    pub batch_size: usize,
    /// Worker threads dispatching per-query searches.
    #[serde(default = "RunnerConfig::default_parallelism")]
    pub parallelism: usize,
    /// Tag attached to TREC-format output lines.
    #[serde(default = "RunnerConfig::default_run_tag")]
    pub run_tag: String,
}

impl RunnerConfig {
    pub(crate) fn default_k() -> usize {
        1000
    }

    pub(crate) fn default_batch_size() -> usize {
        64
    }

    pub(crate) fn default_parallelism() -> usize {
        1
    }

    pub(crate) fn default_run_tag() -> String {
        "drpipe".to_string()
    }

    pub fn validate(&self) -> Result<(), RunError> {
        if self.k == 0 {
            return Err(RunError::InvalidConfig("k must be greater than zero".into()));
        }
        if self.batch_size == 0 {
            return Err(RunError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.parallelism == 0 {
            return Err(RunError::InvalidConfig(
                "parallelism must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            k: Self::default_k(),
            batch_size: Self::default_batch_size(),
            parallelism: Self::default_parallelism(),
            run_tag: Self::default_run_tag(),
        }
    }
}

/// Cooperative cancellation flag, checked between batches. Cancellation
/// discards partial results; a cancelled run emits nothing.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A query that failed to encode or search; the run continued without it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryFailure {
    pub query_id: String,
    pub reason: String,
}

/// The completed run plus the side list of per-query failures. The
/// surrounding tooling decides whether a non-zero failure count is fatal.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: RunFile,
    pub failures: Vec<QueryFailure>,
}

/// Errors that abort a run outright.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("invalid runner config: {0}")]
    InvalidConfig(String),
    /// The cancel token fired; partial output was discarded.
    #[error("run cancelled")]
    Cancelled,
    /// Every query failed; per-query isolation has nothing left to protect.
    #[error("all {failed} queries failed")]
    AllQueriesFailed { failed: usize },
}

/// Orchestrates encoding and searching a topic set into a [`RunFile`].
pub struct SearchRunner {
    cfg: RunnerConfig,
}

impl SearchRunner {
    pub fn new(cfg: RunnerConfig) -> Result<Self, RunError> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    /// Run every query through encode + search.
    ///
    /// Queries are encoded in `batch_size` chunks (amortizing model
    /// invocation for on-the-fly encoders), then each query's search is
    /// dispatched across `parallelism` workers. Results are re-slotted by
    /// original topic position, so output order never depends on worker
    /// completion order. Encoder and index are shared read-only; no
    /// locking is involved.
    pub fn run(
        &self,
        queries: &[Query],
        encoder: &dyn QueryEncoder,
        index: &VectorIndex,
        cancel: &CancelToken,
    ) -> Result<RunOutcome, RunError> {
        let mut slots: Vec<Option<Result<Vec<SearchHit>, String>>> = vec![None; queries.len()];

        for (chunk_no, batch) in queries.chunks(self.cfg.batch_size).enumerate() {
            if cancel.is_cancelled() {
                log::info!("run cancelled before batch {chunk_no}; discarding partial output");
                return Err(RunError::Cancelled);
            }

            let base = chunk_no * self.cfg.batch_size;
            let texts: Vec<String> = batch.iter().map(|q| q.text.clone()).collect();
            let encoded = encoder.encode_batch(&texts);
            debug_assert_eq!(encoded.len(), batch.len());

            let tasks: Vec<(usize, Result<Embedding, EncoderError>)> = encoded
                .into_iter()
                .enumerate()
                .map(|(offset, result)| (base + offset, result))
                .collect();

            self.dispatch_batch(&tasks, index, &mut slots);
        }

        self.assemble(queries, slots)
    }

    /// Fan one batch of encoded queries out to scoped worker threads; each
    /// worker sends `(original_index, result)` over a completion channel.
    fn dispatch_batch(
        &self,
        tasks: &[(usize, Result<Embedding, EncoderError>)],
        index: &VectorIndex,
        slots: &mut [Option<Result<Vec<SearchHit>, String>>],
    ) {
        let k = self.cfg.k;
        let per_worker = tasks.len().div_ceil(self.cfg.parallelism).max(1);

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, Result<Vec<SearchHit>, String>)>();

            for worker_tasks in tasks.chunks(per_worker) {
                let tx = tx.clone();
                scope.spawn(move || {
                    for (idx, encoded) in worker_tasks {
                        let result = match encoded {
                            Ok(embedding) => {
                                index.search(embedding, k).map_err(|e| e.to_string())
                            }
                            Err(err) => Err(err.to_string()),
                        };
                        // The receiver outlives all senders inside the scope.
                        let _ = tx.send((*idx, result));
                    }
                });
            }
            drop(tx);

            for (idx, result) in rx {
                slots[idx] = Some(result);
            }
        });
    }

    fn assemble(
        &self,
        queries: &[Query],
        slots: Vec<Option<Result<Vec<SearchHit>, String>>>,
    ) -> Result<RunOutcome, RunError> {
        let mut run = RunFile::new(self.cfg.k, self.cfg.run_tag.clone());
        let mut failures = Vec::new();

        for (query, slot) in queries.iter().zip(slots) {
            match slot {
                Some(Ok(hits)) => {
                    run.push_query_hits(
                        &query.id,
                        hits.into_iter().map(|hit| (hit.doc_id, hit.score)),
                    );
                }
                Some(Err(reason)) => {
                    log::warn!("query {} failed: {reason}", query.id);
                    failures.push(QueryFailure {
                        query_id: query.id.clone(),
                        reason,
                    });
                }
                None => failures.push(QueryFailure {
                    query_id: query.id.clone(),
                    reason: "worker dropped result".into(),
                }),
            }
        }

        if !queries.is_empty() && failures.len() == queries.len() {
            return Err(RunError::AllQueriesFailed {
                failed: failures.len(),
            });
        }

        log::info!(
            "run complete: {} succeeded, {} failed",
            queries.len() - failures.len(),
            failures.len()
        );
        Ok(RunOutcome { run, failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drp_encoder::{CachedEncoder, EncodedQueryCache, ModelEncoder, ModelEncoderConfig, StubModel};
    use drp_index::{IndexEntry, Similarity};

    fn axis_index() -> VectorIndex {
        VectorIndex::build(
            vec![
                IndexEntry::new("doc-a", vec![1.0, 0.0, 0.0]),
                IndexEntry::new("doc-b", vec![0.0, 1.0, 0.0]),
                IndexEntry::new("doc-c", vec![0.0, 0.0, 1.0]),
            ],
            Similarity::InnerProduct,
        )
        .expect("axis index")
    }

    fn cached_encoder(entries: Vec<(&str, Vec<f32>)>) -> CachedEncoder {
        let cache = EncodedQueryCache::from_entries(
            entries
                .into_iter()
                .map(|(text, vector)| (text.to_string(), vector))
                .collect(),
        )
        .expect("uniform cache");
        CachedEncoder::new(cache)
    }

    fn runner(k: usize, batch_size: usize, parallelism: usize) -> SearchRunner {
        SearchRunner::new(RunnerConfig {
            k,
            batch_size,
            parallelism,
            run_tag: "test-run".into(),
        })
        .expect("valid config")
    }

    #[test]
    fn results_follow_topic_order_not_completion_order() {
        let index = axis_index();
        let encoder = cached_encoder(vec![
            ("first", vec![1.0, 0.0, 0.0]),
            ("second", vec![0.0, 1.0, 0.0]),
            ("third", vec![0.0, 0.0, 1.0]),
        ]);
        let queries = vec![
            Query::new("q1", "first"),
            Query::new("q2", "second"),
            Query::new("q3", "third"),
        ];

        // Batch smaller than the query count, multiple workers.
        let outcome = runner(2, 2, 4)
            .run(&queries, &encoder, &index, &CancelToken::new())
            .expect("run succeeds");

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.run.query_ids(), ["q1", "q2", "q3"]);
        let top: Vec<&str> = outcome
            .run
            .query_ids()
            .iter()
            .map(|qid| {
                outcome
                    .run
                    .hits_for(qid)
                    .next()
                    .expect("each query has hits")
                    .doc_id
                    .as_str()
            })
            .collect();
        assert_eq!(top, ["doc-a", "doc-b", "doc-c"]);
    }

    #[test]
    fn parallelism_setting_does_not_change_output() {
        let index = axis_index();
        let encoder = ModelEncoder::new(
            Box::new(StubModel::new(3)),
            ModelEncoderConfig::default(),
        )
        .expect("encoder");
        let queries: Vec<Query> = (0..17)
            .map(|i| Query::new(format!("q{i}"), format!("query text {i}")))
            .collect();

        let serial = runner(3, 5, 1)
            .run(&queries, &encoder, &index, &CancelToken::new())
            .expect("serial run");
        let parallel = runner(3, 5, 8)
            .run(&queries, &encoder, &index, &CancelToken::new())
            .expect("parallel run");

        assert_eq!(serial.run, parallel.run);
    }

    #[test]
    fn missing_cache_entries_fail_per_query_without_aborting() {
        let index = axis_index();
        let encoder = cached_encoder(vec![("known", vec![1.0, 0.0, 0.0])]);
        let queries = vec![Query::new("q1", "known"), Query::new("q2", "unknown")];

        let outcome = runner(10, 8, 2)
            .run(&queries, &encoder, &index, &CancelToken::new())
            .expect("partial run succeeds");

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].query_id, "q2");
        assert_eq!(outcome.run.query_ids(), ["q1"]);
    }

    #[test]
    fn all_failures_abort_the_run() {
        let index = axis_index();
        let encoder = cached_encoder(vec![("known", vec![1.0, 0.0, 0.0])]);
        let queries = vec![Query::new("q1", "unknown-a"), Query::new("q2", "unknown-b")];

        let err = runner(10, 8, 2)
            .run(&queries, &encoder, &index, &CancelToken::new())
            .expect_err("every query failed");
        assert_eq!(err, RunError::AllQueriesFailed { failed: 2 });
    }

    #[test]
    fn dimension_mismatch_is_isolated_per_query() {
        let index = axis_index(); // 3-dim corpus
        let good = cached_encoder(vec![("fits", vec![1.0, 0.0, 0.0])]);
        let bad = cached_encoder(vec![("too-wide", vec![1.0, 0.0, 0.0, 0.0])]);

        let queries_good = vec![Query::new("q1", "fits")];
        let queries_bad = vec![Query::new("q2", "too-wide")];

        let ok = runner(5, 4, 1)
            .run(&queries_good, &good, &index, &CancelToken::new())
            .expect("good run");
        assert!(ok.failures.is_empty());

        let err = runner(5, 4, 1)
            .run(&queries_bad, &bad, &index, &CancelToken::new())
            .expect_err("sole query fails on dimension mismatch");
        assert_eq!(err, RunError::AllQueriesFailed { failed: 1 });
    }

    #[test]
    fn cancellation_discards_partial_output() {
        let index = axis_index();
        let encoder = cached_encoder(vec![("first", vec![1.0, 0.0, 0.0])]);
        let queries = vec![Query::new("q1", "first")];

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = runner(5, 4, 1)
            .run(&queries, &encoder, &index, &cancel)
            .expect_err("cancelled before first batch");
        assert_eq!(err, RunError::Cancelled);
    }

    #[test]
    fn empty_topic_set_yields_an_empty_run() {
        let index = axis_index();
        let encoder = cached_encoder(vec![("x", vec![1.0, 0.0, 0.0])]);
        let outcome = runner(5, 4, 2)
            .run(&[], &encoder, &index, &CancelToken::new())
            .expect("empty run");
        assert!(outcome.run.hits().is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn invalid_configs_are_rejected_up_front() {
        for cfg in [
            RunnerConfig {
                k: 0,
                ..RunnerConfig::default()
            },
            RunnerConfig {
                batch_size: 0,
                ..RunnerConfig::default()
            },
            RunnerConfig {
                parallelism: 0,
                ..RunnerConfig::default()
            },
        ] {
            let err = SearchRunner::new(cfg).err().expect("config rejected");
            assert!(matches!(err, RunError::InvalidConfig(_)));
        }
    }
}
