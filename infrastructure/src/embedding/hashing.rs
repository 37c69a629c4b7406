//! Local feature-hashing embedder
//!
//! Tokens are lowercased alphanumeric runs, hashed (FNV-1a) into a fixed
//! number of buckets and L2-normalized. Texts that share words end up with
//! a high cosine similarity, which is enough for deduplicating lessons and
//! clustering near-identical proposals without a remote model.

use async_trait::async_trait;
use conclave_application::{Embedder, Embedding, EmbeddingError};
use conclave_domain::CostContext;

const DEFAULT_DIMENSIONS: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn fnv1a(token: &str) -> u64 {
        token
            .bytes()
            .fold(FNV_OFFSET, |hash, b| (hash ^ b as u64).wrapping_mul(FNV_PRIME))
    }

    pub fn vector(&self, text: &str) -> Option<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0;
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (Self::fnv1a(&token.to_lowercase()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
            tokens += 1;
        }
        if tokens == 0 {
            return None;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        vector.iter_mut().for_each(|v| *v /= norm);
        Some(vector)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(
        &self,
        text: &str,
        _cost_context: Option<&CostContext>,
    ) -> Result<Embedding, EmbeddingError> {
        self.vector(text)
            .map(Embedding::new)
            .ok_or(EmbeddingError::EmptyInput)
    }
}
