//! Model-pool switching
//!
//! A switch picks one donor history from the current pool, makes it fit the
//! smallest context window of the new pool, and hands every new member the
//! same history slot together with the donor's lessons and working state.
//! The engine never mutates the current memory: it returns a complete
//! replacement, so the caller swaps state in one assignment or not at all.

use super::condenser::{CondenseError, Condenser};
use super::memory::AgentMemory;
use crate::config::ContextLimits;
use crate::ports::llm_gateway::LlmGateway;
use conclave_domain::{
    CostAccumulator, CostContext, HistoryStore, ModelHistory, ModelId, WorkingState,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateTransferError {
    #[error("New model pool is empty")]
    EmptyPool,

    #[error("Unknown or unavailable models: {}", .0.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", "))]
    UnknownModels(Vec<ModelId>),

    #[error("Donor history could not be condensed to fit: {0}")]
    Condensation(#[from] CondenseError),

    #[error("A consensus cycle is in flight")]
    CycleInFlight,
}

/// Completed switch, ready to replace the agent's memory
#[derive(Debug, Clone, PartialEq)]
pub struct PoolTransfer {
    pub memory: AgentMemory,
    /// Model whose history was carried over
    pub donor: Option<ModelId>,
}

#[derive(Clone)]
pub struct StateTransferEngine {
    gateway: Arc<dyn LlmGateway>,
    condenser: Condenser,
    limits: ContextLimits,
}

impl StateTransferEngine {
    pub fn new(gateway: Arc<dyn LlmGateway>, condenser: Condenser, limits: ContextLimits) -> Self {
        Self {
            gateway,
            condenser,
            limits,
        }
    }

    /// Reject pools that are empty or name unavailable models.
    pub fn validate(&self, new_pool: &[ModelId]) -> Result<Vec<ModelId>, StateTransferError> {
        let mut pool: Vec<ModelId> = Vec::with_capacity(new_pool.len());
        for model in new_pool {
            if !pool.contains(model) {
                pool.push(model.clone());
            }
        }
        if pool.is_empty() {
            return Err(StateTransferError::EmptyPool);
        }
        let unknown: Vec<ModelId> = pool
            .iter()
            .filter(|m| !self.gateway.is_available(m))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(StateTransferError::UnknownModels(unknown));
        }
        Ok(pool)
    }

    pub async fn switch_pool(
        &self,
        current: &AgentMemory,
        new_pool: &[ModelId],
        cost_context: Option<&CostContext>,
        costs: &mut CostAccumulator,
    ) -> Result<PoolTransfer, StateTransferError> {
        let pool = self.validate(new_pool)?;
        let limit = self
            .limits
            .smallest(&pool)
            .unwrap_or(self.limits.default);

        let estimator = self.condenser.estimator();
        let sized: Vec<(ModelId, usize)> = current
            .pool
            .iter()
            .filter_map(|m| {
                current
                    .histories
                    .get(m)
                    .map(|h| (m.clone(), estimator.estimate_history(h)))
            })
            .collect();

        // most tokens that still fit; ties go to the earlier pool member
        let fitting = sized
            .iter()
            .filter(|(_, tokens)| *tokens <= limit)
            .fold(None, |best: Option<&(ModelId, usize)>, candidate| match best {
                Some(b) if b.1 >= candidate.1 => best,
                _ => Some(candidate),
            });
        let largest = sized
            .iter()
            .fold(None, |best: Option<&(ModelId, usize)>, candidate| match best {
                Some(b) if b.1 >= candidate.1 => best,
                _ => Some(candidate),
            });

        let (donor, history, lessons, working_state) = match (fitting, largest) {
            (Some((model, tokens)), _) => {
                debug!(donor = %model, tokens, limit, "Donor history fits");
                (
                    Some(model.clone()),
                    current.histories.get(model).cloned().unwrap_or_default(),
                    current.lessons.get(model).cloned().unwrap_or_default(),
                    current.working_states.get(model).cloned(),
                )
            }
            (None, Some((model, tokens))) => {
                info!(donor = %model, tokens, limit, "Condensing donor history to fit the new pool");
                let (history, lessons, working_state) =
                    self.condense_to_fit(current, model, limit, cost_context, costs).await?;
                (Some(model.clone()), history, lessons, working_state)
            }
            (None, None) => (None, ModelHistory::new(), Vec::new(), None),
        };

        let mut memory = AgentMemory {
            histories: HistoryStore::with_shared(&pool, history),
            ..AgentMemory::default()
        };
        for model in &pool {
            if !lessons.is_empty() {
                memory.lessons.insert(model.clone(), lessons.clone());
            }
            if let Some(state) = &working_state {
                memory.working_states.insert(model.clone(), state.clone());
            }
        }
        memory.pool = pool;

        Ok(PoolTransfer { memory, donor })
    }

    async fn condense_to_fit(
        &self,
        current: &AgentMemory,
        model: &ModelId,
        limit: usize,
        cost_context: Option<&CostContext>,
        costs: &mut CostAccumulator,
    ) -> Result<(ModelHistory, Vec<conclave_domain::Lesson>, Option<WorkingState>), StateTransferError> {
        let mut history = current.histories.get(model).cloned().unwrap_or_default();
        let mut lessons = current.lessons.get(model).cloned().unwrap_or_default();
        let mut working_state = current.working_states.get(model).cloned();

        while self.condenser.estimator().estimate_history(&history) > limit {
            let condensed = self
                .condenser
                .condense(&history, model, lessons, working_state, cost_context, costs)
                .await?;
            history = condensed.history;
            lessons = condensed.lessons;
            working_state = condensed.working_state;
        }
        Ok((history, lessons, working_state))
    }
}
