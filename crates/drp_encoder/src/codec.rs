//! Persisted encoded-query vectors: save/load with full f32 precision.
//!
//! Two codecs cover the two audiences. JSON Lines is human-auditable and
//! still exact (serde_json prints the shortest decimal that round-trips each
//! f32). The binary codec is a schema-versioned bincode payload behind zstd,
//! bit-exact and compact for large topic sets.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zstd::{decode_all, encode_all};

use crate::Embedding;

/// Bump whenever the binary cache layout changes.
pub const CACHE_SCHEMA_VERSION: u16 = 1;

const BINARY_ZSTD_LEVEL: i32 = 3;

/// On-disk representation of the encoded-query cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheCodec {
    /// One JSON object per line: `{"text": ..., "vector": [...]}`.
    #[default]
    JsonLines,
    /// Versioned bincode record, zstd-compressed.
    Binary,
}

/// Errors from cache persistence.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),
    #[error("unsupported cache schema version {found}, expected {expected}")]
    SchemaVersion { found: u16, expected: u16 },
    #[error("malformed cache: {0}")]
    Malformed(String),
}

#[derive(Serialize, Deserialize)]
struct CacheRecord {
    text: String,
    vector: Embedding,
}

#[derive(Serialize, Deserialize)]
struct BinaryCacheFile {
    schema_version: u16,
    records: Vec<CacheRecord>,
}

/// Persist (text, embedding) pairs to `path` with the chosen codec.
pub fn save_cache(
    path: &Path,
    pairs: &[(String, Embedding)],
    codec: CacheCodec,
) -> Result<(), CodecError> {
    match codec {
        CacheCodec::JsonLines => {
            let mut writer = BufWriter::new(File::create(path)?);
            for (text, vector) in pairs {
                let record = CacheRecord {
                    text: text.clone(),
                    vector: vector.clone(),
                };
                serde_json::to_writer(&mut writer, &record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }
        CacheCodec::Binary => {
            let file = BinaryCacheFile {
                schema_version: CACHE_SCHEMA_VERSION,
                records: pairs
                    .iter()
                    .map(|(text, vector)| CacheRecord {
                        text: text.clone(),
                        vector: vector.clone(),
                    })
                    .collect(),
            };
            let encoded = bincode::serialize(&file)?;
            let compressed = encode_all(encoded.as_slice(), BINARY_ZSTD_LEVEL)?;
            fs::write(path, compressed)?;
        }
    }
    log::debug!("saved {} cache entries to {}", pairs.len(), path.display());
    Ok(())
}

/// Load (text, embedding) pairs from `path` with the chosen codec.
pub fn load_cache(
    path: &Path,
    codec: CacheCodec,
) -> Result<Vec<(String, Embedding)>, CodecError> {
    match codec {
        CacheCodec::JsonLines => {
            let reader = BufReader::new(File::open(path)?);
            let mut pairs = Vec::new();
            for (line_no, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: CacheRecord = serde_json::from_str(&line).map_err(|e| {
                    CodecError::Malformed(format!("line {}: {e}", line_no + 1))
                })?;
                pairs.push((record.text, record.vector));
            }
            Ok(pairs)
        }
        CacheCodec::Binary => {
            let compressed = fs::read(path)?;
            let decoded = decode_all(compressed.as_slice())?;
            let file: BinaryCacheFile = bincode::deserialize(&decoded)?;
            if file.schema_version != CACHE_SCHEMA_VERSION {
                return Err(CodecError::SchemaVersion {
                    found: file.schema_version,
                    expected: CACHE_SCHEMA_VERSION,
                });
            }
            Ok(file
                .records
                .into_iter()
                .map(|record| (record.text, record.vector))
                .collect())
        }
    }
}
