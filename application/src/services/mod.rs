//! Application services driven by the agent actor
//!
//! Each service is cheap to clone (collaborators sit behind `Arc`) so a
//! consensus cycle can run on its own task with its own copies.

pub mod budget_tracker;
pub mod condenser;
pub mod consensus;
pub mod lesson_manager;
pub mod memory;
pub mod query_engine;
pub mod state_transfer;

pub use budget_tracker::{BudgetTracker, apply_committed};
pub use condenser::{CondenseError, Condensed, Condenser};
pub use consensus::{ConsensusAggregator, ConsensusError, ConsensusInput, ConsensusOutcome};
pub use lesson_manager::LessonManager;
pub use memory::AgentMemory;
pub use query_engine::{ModelSlice, PerModelQueryEngine, QueryError, QueryRequest};
pub use state_transfer::{PoolTransfer, StateTransferEngine, StateTransferError};
