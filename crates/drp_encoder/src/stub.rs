//! Deterministic stand-in model for tests and offline smoke runs.

use fxhash::hash64;

use crate::{Embedding, ModelFailure, TextModel};

/// Hash-seeded sinusoid embeddings: reproducible vectors at minimal CPU
/// cost, with distinct texts mapping to distinct directions.
pub struct StubModel {
    dimension: usize,
}

impl StubModel {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_one(&self, text: &str) -> Embedding {
        let h = hash64(text.as_bytes());
        (0..self.dimension)
            .map(|idx| {
                let seed = h.rotate_left((idx % 64) as u32);
                ((seed as f32) * 1e-4).sin()
            })
            .collect()
    }
}

impl TextModel for StubModel {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, ModelFailure> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}
