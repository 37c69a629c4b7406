//! Budget tracking
//!
//! Costs gathered during a cycle are flushed through the [`CostSink`], then
//! the committed total is re-read from the [`SpendSource`] and the
//! over-budget flag recomputed from scratch. A failed read yields `None`,
//! which leaves the previous flag untouched.

use crate::ports::persistence::{CostSink, SpendSource};
use conclave_domain::{AgentId, BudgetState, CostRecord};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct BudgetTracker {
    sink: Arc<dyn CostSink>,
    spend: Option<Arc<dyn SpendSource>>,
}

impl BudgetTracker {
    pub fn new(sink: Arc<dyn CostSink>, spend: Option<Arc<dyn SpendSource>>) -> Self {
        Self { sink, spend }
    }

    /// Flush `records` and return the fresh committed total.
    pub async fn record(&self, agent_id: &AgentId, records: Vec<CostRecord>) -> Option<Decimal> {
        if !records.is_empty() {
            let count = records.len();
            match self.sink.flush(records).await {
                Ok(()) => debug!(agent_id = %agent_id, "Flushed {} cost records", count),
                Err(e) => warn!(agent_id = %agent_id, "Cost flush failed: {}", e),
            }
        }
        self.committed(agent_id).await
    }

    /// Committed spend, or `None` when it cannot be read.
    pub async fn committed(&self, agent_id: &AgentId) -> Option<Decimal> {
        let spend = self.spend.as_ref()?;
        match spend.committed(agent_id).await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(agent_id = %agent_id, "Could not read committed spend: {}", e);
                None
            }
        }
    }
}

/// Apply a committed-spend reading; returns whether `over_budget` flipped.
pub fn apply_committed(budget: &mut BudgetState, committed: Option<Decimal>) -> bool {
    match committed {
        Some(total) => budget.recompute(total),
        None => false,
    }
}
