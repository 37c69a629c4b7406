//! Agent identity, capabilities and budget state

pub mod budget;
pub mod identity;

pub use budget::{BudgetMode, BudgetState};
pub use identity::{AgentId, CapabilityGroup, TaskId};
