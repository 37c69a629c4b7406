//! Persistence ports
//!
//! - [`StateStore`]: per-agent lessons, working states and histories
//! - [`CostSink`]: write-out of accumulated cost records
//! - [`SpendSource`]: committed spend per agent, for budget tracking
//!
//! Every agent writes only its own rows, so implementations need to
//! tolerate concurrent callers but never cross-agent locking.

use async_trait::async_trait;
use conclave_domain::{AgentId, ContextMemory, CostRecord};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn persist(&self, agent_id: &AgentId, memory: &ContextMemory) -> Result<(), PersistenceError>;

    /// Saved state, or an empty [`ContextMemory`] when nothing was saved.
    async fn restore(&self, agent_id: &AgentId) -> Result<ContextMemory, PersistenceError>;
}

/// Store that keeps nothing.
pub struct NoStateStore;

#[async_trait]
impl StateStore for NoStateStore {
    async fn persist(&self, _agent_id: &AgentId, _memory: &ContextMemory) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn restore(&self, _agent_id: &AgentId) -> Result<ContextMemory, PersistenceError> {
        Ok(ContextMemory::default())
    }
}

#[async_trait]
pub trait CostSink: Send + Sync {
    /// Write a batch of records collected over one cycle.
    async fn flush(&self, records: Vec<CostRecord>) -> Result<(), PersistenceError>;
}

pub struct NoCostSink;

#[async_trait]
impl CostSink for NoCostSink {
    async fn flush(&self, _records: Vec<CostRecord>) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[async_trait]
pub trait SpendSource: Send + Sync {
    /// Total spend currently committed against `agent_id`.
    async fn committed(&self, agent_id: &AgentId) -> Result<Decimal, PersistenceError>;
}
