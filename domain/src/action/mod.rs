//! Action semantics as seen by the decision loop
//!
//! The loop never executes actions itself. It needs to know how each kind
//! completes ([`catalog`]), which actions are in flight ([`pending`]), and
//! what to do after a result arrives ([`wait`]).

pub mod catalog;
pub mod pending;
pub mod wait;

pub use catalog::{ActionCatalog, ActionTraits, ExecutionMode};
pub use pending::{ActionId, PendingAction, PendingActions};
pub use wait::{NormalizedWait, WaitPolicy, normalize_wait};
