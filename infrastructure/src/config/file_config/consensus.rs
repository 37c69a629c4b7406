//! Consensus and temperature settings (`[consensus]`, `[temperature]`)
//!
//! ```toml
//! [consensus]
//! rule = "majority"           # or "unanimous", "atleast:2", "75%"
//! max_rounds = 4
//! min_responses = 2
//! plurality_fallback = true
//!
//! [consensus.similarity]
//! "spawn_child.task" = 0.90   # compare this field by embedding similarity
//!
//! [temperature]
//! default_max = 1.0
//! min = 0.0
//!
//! [temperature.max]
//! claude = 1.0
//! gpt = 2.0
//! ```

use crate::config::validation::{ConfigIssue, ConfigIssueCode};
use conclave_application::config::ConsensusParams;
use conclave_domain::{DecisionPolicy, FieldRule, MatchRules, QuorumRule, TemperatureSchedule};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConsensusConfig {
    /// Quorum rule: "majority", "unanimous", "atleast:N", "N%"
    pub rule: String,
    pub max_rounds: u32,
    /// Responses needed before a plurality may decide
    pub min_responses: usize,
    pub plurality_fallback: bool,
    /// `"action.field"` → similarity threshold
    pub similarity: BTreeMap<String, f32>,
}

impl Default for FileConsensusConfig {
    fn default() -> Self {
        let params = ConsensusParams::default();
        let similarity = params
            .match_rules
            .iter()
            .filter_map(|(action, field, rule)| match rule {
                FieldRule::Similar { threshold } => Some((format!("{}.{}", action, field), threshold)),
                _ => None,
            })
            .collect();
        Self {
            rule: params.policy.rule.to_string(),
            max_rounds: params.max_rounds,
            min_responses: params.policy.min_responses,
            plurality_fallback: params.policy.plurality_fallback,
            similarity,
        }
    }
}

impl FileConsensusConfig {
    /// Parse the rule string, falling back to majority.
    pub fn parse_rule(&self) -> (QuorumRule, Option<ConfigIssue>) {
        match self.rule.parse() {
            Ok(rule) => (rule, None),
            Err(e) => (
                QuorumRule::default(),
                Some(ConfigIssue::error(
                    ConfigIssueCode::InvalidEnumValue {
                        field: "consensus.rule".to_string(),
                        value: self.rule.clone(),
                        valid_values: vec![
                            "majority".to_string(),
                            "unanimous".to_string(),
                            "atleast:N".to_string(),
                            "N%".to_string(),
                        ],
                    },
                    format!("consensus.rule: {}", e),
                )),
            ),
        }
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues: Vec<ConfigIssue> = self.parse_rule().1.into_iter().collect();
        if self.max_rounds < 1 {
            issues.push(ConfigIssue::out_of_range(
                "consensus.max_rounds",
                self.max_rounds,
                "at least 1",
            ));
        }
        for (key, threshold) in &self.similarity {
            if !key.contains('.') {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::InvalidEnumValue {
                        field: "consensus.similarity".to_string(),
                        value: key.clone(),
                        valid_values: vec!["action.field".to_string()],
                    },
                    format!("consensus.similarity: '{}' is not of the form action.field", key),
                ));
            }
            if !(*threshold > 0.0 && *threshold <= 1.0) {
                issues.push(ConfigIssue::out_of_range(
                    &format!("consensus.similarity.{}", key),
                    threshold,
                    "a value in (0, 1]",
                ));
            }
        }
        issues
    }

    pub fn to_params(&self) -> ConsensusParams {
        let match_rules = self
            .similarity
            .iter()
            .filter_map(|(key, threshold)| key.split_once('.').map(|(a, f)| (a, f, *threshold)))
            .fold(MatchRules::exact(), |rules, (action, field, threshold)| {
                rules.with_rule(action, field, FieldRule::Similar { threshold })
            });
        ConsensusParams {
            max_rounds: self.max_rounds.max(1),
            policy: DecisionPolicy {
                rule: self.parse_rule().0,
                min_responses: self.min_responses,
                plurality_fallback: self.plurality_fallback,
            },
            match_rules,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTemperatureConfig {
    /// Maximum temperature by exact model id or family name
    pub max: BTreeMap<String, f32>,
    pub default_max: f32,
    pub min: f32,
}

impl Default for FileTemperatureConfig {
    fn default() -> Self {
        let schedule = TemperatureSchedule::default();
        Self {
            max: schedule.max_by_model,
            default_max: schedule.default_max,
            min: schedule.min,
        }
    }
}

impl FileTemperatureConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.min < 0.0 {
            issues.push(ConfigIssue::out_of_range("temperature.min", self.min, "at least 0"));
        }
        for (model, max) in &self.max {
            if *max < self.min {
                issues.push(ConfigIssue::out_of_range(
                    &format!("temperature.max.{}", model),
                    max,
                    "at least temperature.min",
                ));
            }
        }
        issues
    }

    pub fn to_schedule(&self) -> TemperatureSchedule {
        TemperatureSchedule {
            max_by_model: self.max.clone(),
            default_max: self.default_max,
            min: self.min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let config = FileConsensusConfig::default();
        assert_eq!(config.rule, "majority");
        assert_eq!(config.similarity.get("spawn_child.task"), Some(&0.90));
        assert_eq!(config.to_params(), ConsensusParams::default());
        assert_eq!(
            FileTemperatureConfig::default().to_schedule(),
            TemperatureSchedule::default()
        );
    }

    #[test]
    fn test_parse_rules() {
        let mut config = FileConsensusConfig::default();
        config.rule = "atleast:2".to_string();
        assert_eq!(config.parse_rule().0, QuorumRule::AtLeast(2));

        config.rule = "75%".to_string();
        assert_eq!(config.to_params().policy.rule, QuorumRule::Percentage(75));

        config.rule = "most".to_string();
        let (rule, issue) = config.parse_rule();
        assert_eq!(rule, QuorumRule::Majority);
        assert!(issue.unwrap().is_error());
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = FileConsensusConfig {
            max_rounds: 0,
            ..FileConsensusConfig::default()
        };
        config.similarity.insert("fetch_web.url".to_string(), 1.5);
        config.similarity.insert("nodot".to_string(), 0.5);

        let issues = config.validate();
        assert_eq!(issues.len(), 3);
        assert!(issues.iter().all(ConfigIssue::is_error));
    }

    #[test]
    fn test_similarity_rules_are_applied() {
        let mut config = FileConsensusConfig::default();
        config.similarity.insert("send_message.content".to_string(), 0.8);
        let rules = config.to_params().match_rules;
        assert_eq!(
            rules.rule_for("send_message", "content"),
            FieldRule::Similar { threshold: 0.8 }
        );
        assert_eq!(rules.rule_for("send_message", "to"), FieldRule::Exact);
    }
}
