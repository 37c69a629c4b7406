//! Cost accounting records
//!
//! Sub-operations of a consensus cycle (queries, embeddings, reflections)
//! add [`CostRecord`]s to a [`CostAccumulator`]; the accumulator is written
//! out once after the whole cycle.

use crate::agent::identity::{AgentId, TaskId};
use crate::core::model::ModelId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Opaque attribution forwarded with every billable call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostContext {
    pub agent_id: Option<AgentId>,
    pub task_id: Option<TaskId>,
    pub purpose: String,
}

impl CostContext {
    pub fn new(agent_id: AgentId, task_id: TaskId, purpose: impl Into<String>) -> Self {
        Self {
            agent_id: Some(agent_id),
            task_id: Some(task_id),
            purpose: purpose.into(),
        }
    }

    /// Same attribution, different purpose.
    pub fn for_purpose(&self, purpose: impl Into<String>) -> Self {
        Self {
            purpose: purpose.into(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Query,
    Embedding,
    Reflection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    pub context: CostContext,
    pub kind: CostKind,
    pub model: Option<ModelId>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub amount: Decimal,
    pub recorded_at: DateTime<Utc>,
}

impl CostRecord {
    pub fn new(context: CostContext, kind: CostKind, amount: Decimal) -> Self {
        Self {
            context,
            kind,
            model: None,
            input_tokens: 0,
            output_tokens: 0,
            amount,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: ModelId) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tokens(mut self, input: u64, output: u64) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }
}

/// Records collected during one cycle, not yet written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostAccumulator {
    records: Vec<CostRecord>,
}

impl CostAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn add(mut self, record: CostRecord) -> Self {
        self.records.push(record);
        self
    }

    pub fn push(&mut self, record: CostRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, other: CostAccumulator) {
        self.records.extend(other.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.records.iter().map(|r| r.amount).sum()
    }

    pub fn records(&self) -> &[CostRecord] {
        &self.records
    }

    /// Take every record, leaving the accumulator empty.
    pub fn drain(&mut self) -> Vec<CostRecord> {
        std::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_accumulate_and_drain() {
        let ctx = CostContext::new(AgentId::from("a1"), TaskId::from("t1"), "consensus");
        let mut acc = CostAccumulator::new()
            .add(CostRecord::new(ctx.clone(), CostKind::Query, Decimal::from_str("0.25").unwrap()))
            .add(CostRecord::new(
                ctx.for_purpose("clustering"),
                CostKind::Embedding,
                Decimal::from_str("0.01").unwrap(),
            ));

        assert_eq!(acc.len(), 2);
        assert_eq!(acc.total(), Decimal::from_str("0.26").unwrap());
        assert_eq!(acc.records()[1].context.purpose, "clustering");

        let drained = acc.drain();
        assert_eq!(drained.len(), 2);
        assert!(acc.is_empty());
    }

    #[test]
    fn test_default_context_is_anonymous() {
        let ctx = CostContext::default();
        assert!(ctx.agent_id.is_none());
        assert!(ctx.task_id.is_none());
    }
}
