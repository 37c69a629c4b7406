//! LLM Gateway port
//!
//! Defines the interface for querying LLM providers. The runtime always
//! sends each model its own message list, so a call usually names a single
//! model; gateways may still fan a call out to several.

use async_trait::async_trait;
use conclave_domain::{CostContext, Message, ModelId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur during LLM gateway operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// The prompt does not fit the model's context window
    #[error("Context length exceeded for {0}")]
    ContextLengthExceeded(ModelId),

    #[error("Model not available: {0}")]
    ModelNotAvailable(ModelId),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout")]
    Timeout,

    #[error("Other error: {0}")]
    Other(String),
}

/// Per-call options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub temperature: Option<f32>,
    pub round: u32,
    pub cost_context: Option<CostContext>,
}

/// Token usage and price of one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub model: ModelId,
    pub content: String,
    pub usage: Option<Usage>,
}

impl ModelResponse {
    pub fn new(model: ModelId, content: impl Into<String>) -> Self {
        Self {
            model,
            content: content.into(),
            usage: None,
        }
    }
}

/// Result of one gateway call: who answered and who did not
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub successful: Vec<ModelResponse>,
    pub failed: Vec<(ModelId, String)>,
}

/// Gateway for LLM communication
///
/// Implementations (adapters) live in the infrastructure layer.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Query `models` with `messages`.
    ///
    /// A context-length overflow is reported as
    /// [`GatewayError::ContextLengthExceeded`] so callers can condense and
    /// retry; every other per-model failure goes into
    /// [`QueryOutcome::failed`].
    async fn query(
        &self,
        messages: &[Message],
        models: &[ModelId],
        options: &QueryOptions,
    ) -> Result<QueryOutcome, GatewayError>;

    /// Whether `model` is known and credentialed.
    fn is_available(&self, _model: &ModelId) -> bool {
        true
    }
}
