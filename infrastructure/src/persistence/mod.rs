//! File-backed persistence adapters
//!
//! - [`JsonFileStateStore`]: one JSON document per agent
//! - [`JsonlCostLedger`]: append-only cost records, also the spend source
//!   for budget tracking

mod cost_ledger;
mod state_store;

pub use cost_ledger::JsonlCostLedger;
pub use state_store::JsonFileStateStore;
