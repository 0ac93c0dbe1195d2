//! Read-only mapping from exact query text to a precomputed embedding.

use std::path::Path;

use fxhash::FxHashMap;

use crate::codec::{self, CacheCodec, CodecError};
use crate::Embedding;

/// Precomputed query embeddings keyed by exact query text.
///
/// Loaded once at construction and never mutated afterwards. Every query
/// text used at search time must be present when the cached encoder variant
/// is in play; absence is a hard failure at lookup.
pub struct EncodedQueryCache {
    entries: FxHashMap<String, Embedding>,
    dimension: Option<usize>,
}

impl EncodedQueryCache {
    /// Build a cache from (text, embedding) pairs, validating that all
    /// embeddings share one dimension.
    pub fn from_entries(
        pairs: Vec<(String, Embedding)>,
    ) -> Result<Self, CodecError> {
        let mut entries = FxHashMap::default();
        let mut dimension = None;
        for (text, vector) in pairs {
            match dimension {
                None => dimension = Some(vector.len()),
                Some(expected) if expected != vector.len() => {
                    return Err(CodecError::Malformed(format!(
                        "embedding for {text:?} has dimension {}, expected {expected}",
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
            if entries.contains_key(&text) {
                log::warn!("duplicate cache entry for {text:?}, last occurrence wins");
            }
            entries.insert(text, vector);
        }
        Ok(Self { entries, dimension })
    }

    /// Load a persisted cache file with the given codec.
    pub fn load(path: impl AsRef<Path>, codec: CacheCodec) -> Result<Self, CodecError> {
        let pairs = codec::load_cache(path.as_ref(), codec)?;
        log::info!(
            "loaded encoded-query cache: {} entries from {}",
            pairs.len(),
            path.as_ref().display()
        );
        Self::from_entries(pairs)
    }

    /// Exact-text lookup.
    pub fn get(&self, text: &str) -> Option<&Embedding> {
        self.entries.get(text)
    }

    pub fn contains(&self, text: &str) -> bool {
        self.entries.contains_key(text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared embedding width; `None` for an empty cache.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }
}
