//! Per-model working-memory summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single current free-text summary a model keeps about its task.
///
/// Replaced wholesale on every successful reflection, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkingState {
    pub summary: String,
    pub updated_at: DateTime<Utc>,
}

impl WorkingState {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            updated_at: Utc::now(),
        }
    }
}
