//! Runtime configuration: decision-cycle tuning.
//!
//! [`RuntimeConfig`] groups the static parameters every agent actor and
//! service reads. It is built once at startup (the infrastructure layer
//! loads it from TOML files and the environment) and shared read-only.

use conclave_domain::{DecisionPolicy, MatchRules, ModelId, TemperatureSchedule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Consensus protocol parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Rounds before a forced decision.
    pub max_rounds: u32,
    pub policy: DecisionPolicy,
    pub match_rules: MatchRules,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            max_rounds: 4,
            policy: DecisionPolicy::default(),
            match_rules: MatchRules::default(),
        }
    }
}

/// History condensation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensationParams {
    /// Share of the original tokens kept after condensing.
    pub keep_token_fraction: f64,
    /// Newest entries always kept.
    pub min_kept_entries: usize,
}

impl Default for CondensationParams {
    fn default() -> Self {
        Self {
            keep_token_fraction: 0.20,
            min_kept_entries: 2,
        }
    }
}

/// Lesson accumulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonParams {
    pub similarity_threshold: f32,
    pub max_lessons: usize,
}

impl Default for LessonParams {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.90,
            max_lessons: 100,
        }
    }
}

/// Context window sizes in tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextLimits {
    pub default: usize,
    pub per_model: BTreeMap<String, usize>,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            default: 128_000,
            per_model: BTreeMap::new(),
        }
    }
}

impl ContextLimits {
    pub fn for_model(&self, model: &ModelId) -> usize {
        self.per_model
            .get(model.as_str())
            .copied()
            .unwrap_or(self.default)
    }

    /// Smallest limit among `models`.
    pub fn smallest(&self, models: &[ModelId]) -> Option<usize> {
        models.iter().map(|m| self.for_model(m)).min()
    }
}

/// Everything the agent runtime is tuned by.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub consensus: ConsensusParams,
    pub temperature: TemperatureSchedule,
    pub condensation: CondensationParams,
    pub lessons: LessonParams,
    pub context_limits: ContextLimits,
    /// Delay before retrying after a failed consensus cycle.
    pub retry_delay: Duration,
    /// How long shutdown waits for each router before aborting it.
    pub router_shutdown_timeout: Duration,
    /// How long a router keeps finished commands queryable.
    pub command_retention: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            consensus: ConsensusParams::default(),
            temperature: TemperatureSchedule::default(),
            condensation: CondensationParams::default(),
            lessons: LessonParams::default(),
            context_limits: ContextLimits::default(),
            retry_delay: Duration::from_secs(5),
            router_shutdown_timeout: Duration::from_secs(5),
            command_retention: Duration::from_secs(600),
        }
    }
}

impl RuntimeConfig {
    // ==================== Builder Methods ====================

    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.consensus.max_rounds = rounds;
        self
    }

    pub fn with_context_limit(mut self, model: impl Into<String>, limit: usize) -> Self {
        self.context_limits.per_model.insert(model.into(), limit);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_domain::QuorumRule;

    #[test]
    fn test_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.consensus.max_rounds, 4);
        assert_eq!(config.consensus.policy.min_responses, 2);
        assert_eq!(config.consensus.policy.rule, QuorumRule::Majority);
        assert!(config.consensus.policy.plurality_fallback);
        assert_eq!(config.condensation.keep_token_fraction, 0.20);
        assert_eq!(config.lessons.max_lessons, 100);
        assert_eq!(config.context_limits.default, 128_000);
        assert_eq!(config.retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_context_limits() {
        let config = RuntimeConfig::default().with_context_limit("small-model", 8_000);
        let limits = &config.context_limits;
        assert_eq!(limits.for_model(&ModelId::from("small-model")), 8_000);
        assert_eq!(limits.for_model(&ModelId::from("other")), 128_000);
        assert_eq!(
            limits.smallest(&[ModelId::from("other"), ModelId::from("small-model")]),
            Some(8_000)
        );
        assert_eq!(limits.smallest(&[]), None);
    }
}
