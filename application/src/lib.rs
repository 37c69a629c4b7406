//! Application layer for conclave
//!
//! This crate contains port definitions, the services of the decision
//! cycle, and the agent runtime that drives them. It depends only on the
//! domain layer; adapters for the ports live in the infrastructure crate.

pub mod agent;
pub mod config;
pub mod ports;
pub mod services;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use agent::{
    AgentError, AgentHandle, AgentRuntime, AgentServices, AgentSnapshot, AgentSpec, Collaborators,
};
pub use config::RuntimeConfig;
pub use ports::{
    action_executor::{ActionError, ActionExecutor, ActionRequest, CommandHandle, CommandStatus, Execution},
    broadcaster::{BroadcastEvent, Broadcaster},
    embedding::{Embedder, Embedding, EmbeddingError},
    llm_gateway::{GatewayError, LlmGateway, ModelResponse, QueryOptions, QueryOutcome, Usage},
    persistence::{CostSink, PersistenceError, SpendSource, StateStore},
    reflection::{Reflection, ReflectionError, ReflectionOptions, Reflector},
};
