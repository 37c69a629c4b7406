//! Round-based descending temperature schedule
//!
//! Early rounds explore at the model family's maximum temperature; each
//! refinement round steps down so the final round is the most deterministic.
//!
//! ```text
//! temperature = max − (round − 1) × max / (total_rounds − 1), floored at min
//! ```

use crate::core::model::ModelId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureSchedule {
    /// Maximum temperature keyed by exact model id or by family name
    /// (`claude`, `gpt`, `gemini`); exact ids take precedence.
    pub max_by_model: BTreeMap<String, f32>,
    pub default_max: f32,
    pub min: f32,
}

impl Default for TemperatureSchedule {
    fn default() -> Self {
        let max_by_model = [("claude", 1.0), ("gpt", 2.0), ("gemini", 2.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        Self {
            max_by_model,
            default_max: 1.0,
            min: 0.0,
        }
    }
}

impl TemperatureSchedule {
    pub fn max_for(&self, model: &ModelId) -> f32 {
        self.max_by_model
            .get(model.as_str())
            .or_else(|| self.max_by_model.get(model.family().as_str()))
            .copied()
            .unwrap_or(self.default_max)
    }

    /// Temperature for `round` (1-based; 0 is treated as 1) out of `total_rounds`.
    pub fn temperature(&self, model: &ModelId, round: u32, total_rounds: u32) -> f32 {
        let max = self.max_for(model);
        let round = round.max(1);
        if total_rounds <= 1 {
            return max.max(self.min);
        }
        let step = max / (total_rounds - 1) as f32;
        (max - (round - 1) as f32 * step).max(self.min)
    }
}
