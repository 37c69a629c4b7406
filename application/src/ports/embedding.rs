//! Embedding port
//!
//! Used for lesson deduplication and for similarity-matched proposal fields.

use async_trait::async_trait;
use conclave_domain::{CostContext, CostRecord};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    RequestFailed(String),

    #[error("Empty input")]
    EmptyInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
    /// Cost of the call, attributed to the forwarded context. `None` when
    /// no context was given or the call was free.
    pub cost: Option<CostRecord>,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector, cost: None }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`. `cost_context` is forwarded unchanged into the
    /// returned cost record.
    async fn embed(
        &self,
        text: &str,
        cost_context: Option<&CostContext>,
    ) -> Result<Embedding, EmbeddingError>;
}
