//! Serializable snapshot of an agent's per-model memory

use super::lesson::Lesson;
use super::working_state::WorkingState;
use crate::core::model::ModelId;
use crate::history::ModelHistory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lessons per model
pub type ContextLessons = BTreeMap<ModelId, Vec<Lesson>>;

/// Working state per model
pub type WorkingStates = BTreeMap<ModelId, WorkingState>;

/// Everything an agent persists between restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextMemory {
    pub lessons: ContextLessons,
    pub working_states: WorkingStates,
    pub histories: BTreeMap<ModelId, ModelHistory>,
    /// Groups of models whose histories are one shared history
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shared: Vec<Vec<ModelId>>,
}

impl ContextMemory {
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty() && self.working_states.is_empty() && self.histories.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored snapshot; absent, blank or `null` input yields empty maps.
    pub fn from_json(raw: Option<&str>) -> serde_json::Result<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("null") => Ok(Self::default()),
            Some(raw) => serde_json::from_str(raw),
        }
    }
}
