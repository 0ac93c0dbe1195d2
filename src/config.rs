//! YAML configuration for the whole pipeline.
//!
//! All stage knobs live in a single versioned YAML document so deployment
//! tooling can resolve environment-sensitive values (batch size, thread
//! count) outside the core and hand the result in. Example:
//!
//! ```yaml
//! version: "1.0"
//! name: "msmarco-passage-dev smoke"
//!
//! encoder:
//!   mode: cached
//!   cache_path: "queries.jsonl"
//!   cache_codec: json_lines
//!
//! index:
//!   similarity: inner_product
//!
//! runner:
//!   k: 1000
//!   batch_size: 256
//!   parallelism: 16
//!   run_tag: "drpipe"
//!
//! output:
//!   format: msmarco
//!
//! eval:
//!   mrr_cutoff: 10
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drp_encoder::{
    CacheCodec, CachedEncoder, ModelEncoder, ModelEncoderConfig, QueryEncoder, RetryConfig,
    StubModel,
};
use drp_eval::Metric;
use drp_index::Similarity;
use drp_run::{RunFormat, RunnerConfig};

use crate::PipelineError;

const SUPPORTED_VERSION: &str = "1.0";

/// Errors that can occur when loading pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level pipeline configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Configuration format version.
    pub version: String,

    /// Optional configuration name/description.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub encoder: EncoderSection,

    #[serde(default)]
    pub index: IndexSection,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub eval: EvalSection,
}

/// Which encoder variant to construct.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EncoderMode {
    /// Precomputed embeddings looked up by exact query text.
    #[default]
    Cached,
    /// Deterministic stub model run on the fly (tests/smoke runs).
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EncoderSection {
    #[serde(default)]
    pub mode: EncoderMode,
    /// Persisted query-vector file (required for `cached`).
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(default)]
    pub cache_codec: CacheCodec,
    /// On-the-fly batch size.
    #[serde(default = "EncoderSection::default_batch_size")]
    pub batch_size: usize,
    /// L2-normalize on-the-fly outputs (pair with cosine indexes).
    #[serde(default)]
    pub normalize: bool,
    /// Retry bound for transient model failures.
    #[serde(default = "EncoderSection::default_max_retries")]
    pub max_retries: u32,
    /// Stub embedding width.
    #[serde(default = "EncoderSection::default_stub_dimension")]
    pub stub_dimension: usize,
}

impl EncoderSection {
    fn default_batch_size() -> usize {
        64
    }

    fn default_max_retries() -> u32 {
        2
    }

    fn default_stub_dimension() -> usize {
        384
    }
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            mode: EncoderMode::default(),
            cache_path: None,
            cache_codec: CacheCodec::default(),
            batch_size: Self::default_batch_size(),
            normalize: false,
            max_retries: Self::default_max_retries(),
            stub_dimension: Self::default_stub_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct IndexSection {
    #[serde(default)]
    pub similarity: Similarity,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct OutputSection {
    #[serde(default)]
    pub format: RunFormat,
    /// Optional emission depth below the runner's k.
    #[serde(default)]
    pub depth: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EvalSection {
    /// Qrels file; evaluation is skipped by tooling when absent.
    #[serde(default)]
    pub qrels_path: Option<PathBuf>,
    #[serde(default = "EvalSection::default_mrr_cutoff")]
    pub mrr_cutoff: usize,
}

impl EvalSection {
    fn default_mrr_cutoff() -> usize {
        10
    }
}

impl Default for EvalSection {
    fn default() -> Self {
        Self {
            qrels_path: None,
            mrr_cutoff: Self::default_mrr_cutoff(),
        }
    }
}

impl PipelineConfig {
    /// Parse a YAML document and validate it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let text = fs::read_to_string(path.as_ref())?;
        let config = Self::from_yaml_str(&text)?;
        log::info!("loaded pipeline config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.version != SUPPORTED_VERSION {
            return Err(ConfigLoadError::UnsupportedVersion(self.version.clone()));
        }
        if self.encoder.mode == EncoderMode::Cached && self.encoder.cache_path.is_none() {
            return Err(ConfigLoadError::Validation(
                "encoder.cache_path is required for cached mode".into(),
            ));
        }
        if self.encoder.batch_size == 0 {
            return Err(ConfigLoadError::Validation(
                "encoder.batch_size must be greater than zero".into(),
            ));
        }
        if self.encoder.mode == EncoderMode::Stub && self.encoder.stub_dimension == 0 {
            return Err(ConfigLoadError::Validation(
                "encoder.stub_dimension must be greater than zero".into(),
            ));
        }
        if self.eval.mrr_cutoff == 0 {
            return Err(ConfigLoadError::Validation(
                "eval.mrr_cutoff must be greater than zero".into(),
            ));
        }
        if let Some(depth) = self.output.depth {
            if depth == 0 || depth > self.runner.k {
                return Err(ConfigLoadError::Validation(format!(
                    "output.depth {depth} must be in 1..=runner.k ({})",
                    self.runner.k
                )));
            }
        }
        self.runner
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))
    }

    /// Construct the configured encoder variant.
    pub fn build_encoder(&self) -> Result<Box<dyn QueryEncoder>, PipelineError> {
        match self.encoder.mode {
            EncoderMode::Cached => {
                let path = self.encoder.cache_path.as_ref().ok_or_else(|| {
                    ConfigLoadError::Validation(
                        "encoder.cache_path is required for cached mode".into(),
                    )
                })?;
                let encoder = CachedEncoder::load(path, self.encoder.cache_codec)?;
                Ok(Box::new(encoder))
            }
            EncoderMode::Stub => {
                let cfg = ModelEncoderConfig {
                    batch_size: self.encoder.batch_size,
                    normalize: self.encoder.normalize,
                    retry: RetryConfig::default().with_max_retries(self.encoder.max_retries),
                };
                let model = StubModel::new(self.encoder.stub_dimension);
                Ok(Box::new(ModelEncoder::new(Box::new(model), cfg)?))
            }
        }
    }

    /// The configured headline metric.
    pub fn metric(&self) -> Metric {
        Metric::Mrr {
            cutoff: self.eval.mrr_cutoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_stub_yaml() -> &'static str {
        r#"
version: "1.0"
encoder:
  mode: stub
  stub_dimension: 16
runner:
  k: 100
  batch_size: 8
  parallelism: 2
"#
    }

    #[test]
    fn minimal_document_parses_with_defaults() {
        let config = PipelineConfig::from_yaml_str(minimal_stub_yaml()).expect("parse");
        assert_eq!(config.runner.k, 100);
        assert_eq!(config.index.similarity, Similarity::InnerProduct);
        assert_eq!(config.output.format, RunFormat::Trec);
        assert_eq!(config.metric(), Metric::Mrr { cutoff: 10 });
    }

    #[test]
    fn unsupported_versions_are_rejected() {
        let yaml = minimal_stub_yaml().replace("\"1.0\"", "\"9.9\"");
        let err = PipelineConfig::from_yaml_str(&yaml).expect_err("version gate");
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(v) if v == "9.9"));
    }

    #[test]
    fn cached_mode_requires_a_cache_path() {
        let yaml = r#"
version: "1.0"
encoder:
  mode: cached
"#;
        let err = PipelineConfig::from_yaml_str(yaml).expect_err("missing cache_path");
        assert!(matches!(err, ConfigLoadError::Validation(msg) if msg.contains("cache_path")));
    }

    #[test]
    fn output_depth_must_not_exceed_runner_k() {
        let yaml = r#"
version: "1.0"
encoder:
  mode: stub
runner:
  k: 10
output:
  depth: 20
"#;
        let err = PipelineConfig::from_yaml_str(yaml).expect_err("depth beyond k");
        assert!(matches!(err, ConfigLoadError::Validation(msg) if msg.contains("depth")));
    }

    #[test]
    fn stub_encoder_builds_with_declared_dimension() {
        let config = PipelineConfig::from_yaml_str(minimal_stub_yaml()).expect("parse");
        let encoder = config.build_encoder().expect("stub encoder builds");
        assert_eq!(encoder.dimension(), Some(16));
    }
}
