//! Per-agent budget state

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How an agent's spending is limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetMode {
    /// No budget tracking; never over budget
    #[default]
    Na,
    /// Root agent with an optional user-set limit
    Root,
    /// Child agent with an allocation carved out of its parent's budget
    Allocated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetState {
    pub mode: BudgetMode,
    pub allocated: Option<Decimal>,
    pub committed: Decimal,
    over_budget: bool,
}

impl Default for BudgetState {
    fn default() -> Self {
        Self::na()
    }
}

impl BudgetState {
    pub fn new(mode: BudgetMode, allocated: Option<Decimal>) -> Self {
        Self {
            mode,
            allocated,
            committed: Decimal::ZERO,
            over_budget: false,
        }
    }

    pub fn na() -> Self {
        Self::new(BudgetMode::Na, None)
    }

    pub fn root(limit: Option<Decimal>) -> Self {
        Self::new(BudgetMode::Root, limit)
    }

    pub fn allocated(amount: Decimal) -> Self {
        Self::new(BudgetMode::Allocated, Some(amount))
    }

    pub fn over_budget(&self) -> bool {
        self.over_budget
    }

    /// Replace the committed total and re-derive `over_budget` from scratch.
    ///
    /// Returns `true` when the over-budget flag flipped.
    pub fn recompute(&mut self, committed: Decimal) -> bool {
        self.committed = committed;
        let over = self.mode != BudgetMode::Na
            && self.allocated.is_some_and(|allocated| committed > allocated);
        let changed = over != self.over_budget;
        self.over_budget = over;
        changed
    }

    /// Amount left before the allocation is exhausted.
    pub fn remaining(&self) -> Option<Decimal> {
        match self.mode {
            BudgetMode::Na => None,
            _ => self.allocated.map(|a| a - self.committed),
        }
    }
}
