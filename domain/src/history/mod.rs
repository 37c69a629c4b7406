//! Per-model conversation histories
//!
//! - [`HistoryEntry`]: one immutable entry (message, decision, result, event)
//! - [`ModelHistory`]: newest-first sequence of entries for one model
//! - [`HistoryStore`]: model-id → history mapping with explicit aliasing
//! - [`TokenEstimator`]: BPE token counts for text and histories
//! - [`split_by_count`] / [`split_by_token_fraction`]: condensation splits

pub mod entry;
pub mod model_history;
pub mod split;
pub mod store;
pub mod tokens;

pub use entry::{EntryKind, HistoryEntry};
pub use model_history::ModelHistory;
pub use split::{HistorySplit, split_by_count, split_by_token_fraction};
pub use store::{HistoryId, HistoryStore};
pub use tokens::{TokenError, TokenEstimator};
