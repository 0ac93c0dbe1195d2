//! drp_encoder: turn query text into dense embeddings.
//!
//! Two encoder variants share one trait. [`ModelEncoder`] invokes an injected
//! text-to-vector model (a trained encoder consumed as a black box), batching
//! queries to amortize invocation overhead and retrying transient failures.
//! [`CachedEncoder`] looks up precomputed embeddings by exact query text and
//! fails hard on a miss so benchmark runs stay reproducible.

mod cache;
pub mod codec;
mod retry;
mod stub;

pub use cache::EncodedQueryCache;
pub use retry::{execute_with_retry, RetryConfig};
pub use stub::StubModel;

pub use codec::{CacheCodec, CodecError};

use std::path::Path;

use thiserror::Error;

/// Fixed-length dense query/passage representation.
pub type Embedding = Vec<f32>;

/// Errors surfaced by query encoding.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncoderError {
    /// Cached lookup miss. Deterministic, never retried, and never falls
    /// back to on-the-fly encoding.
    #[error("no cached embedding for query text: {0:?}")]
    MissingEntry(String),
    /// The underlying model invocation failed after any retries.
    #[error("model invocation failed: {0}")]
    ModelFailure(String),
    /// Encoder construction parameters are inconsistent.
    #[error("invalid encoder config: {0}")]
    InvalidConfig(String),
}

/// A failed model invocation. `transient` marks resource-style failures
/// worth retrying (the model stays a black box, so it decides).
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ModelFailure {
    pub message: String,
    pub transient: bool,
}

impl ModelFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

/// Black-box trained text encoder: text in, fixed-width vector out.
///
/// Implementations may hold a loaded model for their lifetime; the resource
/// is released when the encoder owning them is dropped.
pub trait TextModel: Send + Sync {
    /// Output embedding width. Every returned vector must have this length.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ModelFailure>;
}

/// Polymorphic query-encoding capability shared by both variants.
pub trait QueryEncoder: Send + Sync {
    /// Encode one query text.
    fn encode(&self, text: &str) -> Result<Embedding, EncoderError>;

    /// Encode many query texts, reporting success or failure per query so a
    /// caller can isolate individual failures instead of aborting the batch.
    fn encode_batch(&self, texts: &[String]) -> Vec<Result<Embedding, EncoderError>> {
        texts.iter().map(|text| self.encode(text)).collect()
    }

    /// Embedding width this encoder produces, when known up front.
    fn dimension(&self) -> Option<usize> {
        None
    }
}

/// Configuration for the on-the-fly [`ModelEncoder`].
///
/// Batch size and retry bounds are injected rather than hardcoded;
/// environment-sensitive defaults are a deployment concern resolved by the
/// caller's configuration layer.
#[derive(Debug, Clone)]
pub struct ModelEncoderConfig {
    /// Maximum texts per model invocation.
    pub batch_size: usize,
    /// L2-normalize model outputs. Enable when the index side scores with
    /// cosine over normalized vectors; leave off for dot-product stacks.
    pub normalize: bool,
    /// Bounded retry policy for transient model failures.
    pub retry: RetryConfig,
}

impl Default for ModelEncoderConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            normalize: false,
            retry: RetryConfig::default(),
        }
    }
}

impl ModelEncoderConfig {
    pub fn validate(&self) -> Result<(), EncoderError> {
        if self.batch_size == 0 {
            return Err(EncoderError::InvalidConfig(
                "batch_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// On-the-fly encoder wrapping an injected [`TextModel`].
pub struct ModelEncoder {
    model: Box<dyn TextModel>,
    cfg: ModelEncoderConfig,
}

impl ModelEncoder {
    pub fn new(model: Box<dyn TextModel>, cfg: ModelEncoderConfig) -> Result<Self, EncoderError> {
        cfg.validate()?;
        Ok(Self { model, cfg })
    }

    /// One retried model invocation for a single chunk of texts, with output
    /// count and width validated against the model's declared dimension.
    fn invoke_chunk(&self, chunk: &[String]) -> Result<Vec<Embedding>, EncoderError> {
        let vectors = execute_with_retry(&self.cfg.retry, |attempt| {
            if attempt > 0 {
                log::warn!("retrying model invocation (attempt {attempt})");
            }
            self.model.embed_batch(chunk)
        })
        .map_err(|failure| EncoderError::ModelFailure(failure.message))?;

        if vectors.len() != chunk.len() {
            return Err(EncoderError::ModelFailure(format!(
                "model returned {} embeddings for {} inputs",
                vectors.len(),
                chunk.len()
            )));
        }

        let expected = self.model.dimension();
        let mut out = Vec::with_capacity(vectors.len());
        for mut vector in vectors {
            if vector.len() != expected {
                return Err(EncoderError::ModelFailure(format!(
                    "model produced a {}-dim vector, declared dimension is {expected}",
                    vector.len()
                )));
            }
            if self.cfg.normalize {
                l2_normalize_in_place(&mut vector);
            }
            out.push(vector);
        }
        Ok(out)
    }
}

impl QueryEncoder for ModelEncoder {
    fn encode(&self, text: &str) -> Result<Embedding, EncoderError> {
        let chunk = [text.to_string()];
        let mut vectors = self.invoke_chunk(&chunk)?;
        vectors
            .pop()
            .ok_or_else(|| EncoderError::ModelFailure("model returned no embeddings".into()))
    }

    fn encode_batch(&self, texts: &[String]) -> Vec<Result<Embedding, EncoderError>> {
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.cfg.batch_size) {
            match self.invoke_chunk(chunk) {
                Ok(vectors) => results.extend(vectors.into_iter().map(Ok)),
                // A hard chunk failure is charged to every query in it; the
                // caller continues with later chunks.
                Err(err) => results.extend(chunk.iter().map(|_| Err(err.clone()))),
            }
        }
        results
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.model.dimension())
    }
}

/// Cached encoder over precomputed query embeddings.
///
/// The full mapping is loaded eagerly at construction and read-only
/// afterwards. Lookup is by exact query text; an absent text is a hard
/// [`EncoderError::MissingEntry`].
pub struct CachedEncoder {
    cache: EncodedQueryCache,
}

impl CachedEncoder {
    pub fn new(cache: EncodedQueryCache) -> Self {
        Self { cache }
    }

    /// Load the persisted encoded-query file and wrap it.
    pub fn load(path: impl AsRef<Path>, codec: CacheCodec) -> Result<Self, CodecError> {
        Ok(Self::new(EncodedQueryCache::load(path, codec)?))
    }

    pub fn cache(&self) -> &EncodedQueryCache {
        &self.cache
    }
}

impl QueryEncoder for CachedEncoder {
    fn encode(&self, text: &str) -> Result<Embedding, EncoderError> {
        self.cache
            .get(text)
            .cloned()
            .ok_or_else(|| EncoderError::MissingEntry(text.to_string()))
    }

    fn dimension(&self) -> Option<usize> {
        self.cache.dimension()
    }
}

/// In-place L2 normalization; accumulates in f64 for stability.
pub(crate) fn l2_normalize_in_place(v: &mut [f32]) {
    let norm = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let inv = 1.0 / norm as f32;
        for x in v.iter_mut() {
            *x *= inv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyModel {
        calls: AtomicU32,
        fail_first: u32,
        transient: bool,
    }

    impl TextModel for FlakyModel {
        fn dimension(&self) -> usize {
            2
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ModelFailure> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(if self.transient {
                    ModelFailure::transient("resource busy")
                } else {
                    ModelFailure::permanent("bad input")
                });
            }
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::default().with_base_delay_ms(1).with_max_retries(2)
    }

    #[test]
    fn model_encoder_encodes_single_text() {
        let encoder = ModelEncoder::new(
            Box::new(StubModel::new(8)),
            ModelEncoderConfig::default(),
        )
        .expect("valid config");

        let embedding = encoder.encode("what is rust").expect("encode succeeds");
        assert_eq!(embedding.len(), 8);
        assert_eq!(encoder.dimension(), Some(8));
    }

    #[test]
    fn model_encoder_batches_and_preserves_order() {
        let cfg = ModelEncoderConfig {
            batch_size: 2,
            ..ModelEncoderConfig::default()
        };
        let encoder =
            ModelEncoder::new(Box::new(StubModel::new(4)), cfg).expect("valid config");

        let texts: Vec<String> = (0..5).map(|i| format!("query {i}")).collect();
        let batched = encoder.encode_batch(&texts);
        assert_eq!(batched.len(), 5);
        for (text, result) in texts.iter().zip(&batched) {
            let one = encoder.encode(text).expect("single encode");
            assert_eq!(result.as_ref().expect("batch encode"), &one);
        }
    }

    #[test]
    fn transient_model_failures_are_retried() {
        let cfg = ModelEncoderConfig {
            retry: fast_retry(),
            ..ModelEncoderConfig::default()
        };
        let encoder = ModelEncoder::new(
            Box::new(FlakyModel {
                calls: AtomicU32::new(0),
                fail_first: 2,
                transient: true,
            }),
            cfg,
        )
        .expect("valid config");

        let embedding = encoder.encode("hello").expect("retry should recover");
        assert_eq!(embedding.len(), 2);
    }

    #[test]
    fn permanent_model_failures_are_not_retried() {
        let cfg = ModelEncoderConfig {
            retry: fast_retry(),
            ..ModelEncoderConfig::default()
        };
        let model = FlakyModel {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
            transient: false,
        };
        let encoder = ModelEncoder::new(Box::new(model), cfg).expect("valid config");

        let err = encoder.encode("hello").expect_err("permanent failure");
        assert!(matches!(err, EncoderError::ModelFailure(_)));
    }

    #[test]
    fn batch_failure_is_charged_to_every_query_in_the_chunk() {
        let cfg = ModelEncoderConfig {
            batch_size: 2,
            retry: fast_retry(),
            ..ModelEncoderConfig::default()
        };
        // First chunk fails permanently, later chunks succeed.
        let encoder = ModelEncoder::new(
            Box::new(FlakyModel {
                calls: AtomicU32::new(0),
                fail_first: 1,
                transient: false,
            }),
            cfg,
        )
        .expect("valid config");

        let texts: Vec<String> = (0..4).map(|i| format!("query {i}")).collect();
        let results = encoder.encode_batch(&texts);
        assert!(results[0].is_err() && results[1].is_err());
        assert!(results[2].is_ok() && results[3].is_ok());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let cfg = ModelEncoderConfig {
            batch_size: 0,
            ..ModelEncoderConfig::default()
        };
        let err = ModelEncoder::new(Box::new(StubModel::new(4)), cfg)
            .err()
            .expect("config should be invalid");
        assert!(matches!(err, EncoderError::InvalidConfig(_)));
    }

    #[test]
    fn normalized_outputs_have_unit_length() {
        let cfg = ModelEncoderConfig {
            normalize: true,
            ..ModelEncoderConfig::default()
        };
        let encoder =
            ModelEncoder::new(Box::new(StubModel::new(16)), cfg).expect("valid config");
        let v = encoder.encode("normalize me").expect("encode");
        let norm: f64 = v.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cached_encoder_round_trips_stored_embeddings() {
        let cache = EncodedQueryCache::from_entries(vec![
            ("what is rust".to_string(), vec![0.25_f32, -0.5, 0.125]),
            ("who wrote hamlet".to_string(), vec![1.0, 2.0, 3.0]),
        ])
        .expect("uniform cache");
        let encoder = CachedEncoder::new(cache);

        let v = encoder.encode("what is rust").expect("hit");
        assert_eq!(v, vec![0.25, -0.5, 0.125]);
        assert_eq!(encoder.dimension(), Some(3));
    }

    #[test]
    fn cached_encoder_misses_are_hard_failures() {
        let cache = EncodedQueryCache::from_entries(vec![(
            "known query".to_string(),
            vec![1.0_f32],
        )])
        .expect("uniform cache");
        let encoder = CachedEncoder::new(cache);

        let err = encoder.encode("unknown query").expect_err("miss");
        assert!(matches!(err, EncoderError::MissingEntry(text) if text == "unknown query"));
    }
}
