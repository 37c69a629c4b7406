//! Root agent settings (`[agent]`)

use crate::config::validation::{ConfigIssue, ConfigIssueCode};
use conclave_domain::{BudgetState, CapabilityGroup, ModelId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

/// Settings for the agent started from the command line
///
/// # Example
///
/// ```toml
/// [agent]
/// models = ["claude-sonnet-4.5", "gpt-5.2-codex", "gemini-3-pro-preview"]
/// capabilities = ["hierarchy", "local_execution"]
/// budget = "2.50"                 # spending limit, omit for none
/// state_dir = "~/.local/share/conclave/state"
/// cost_ledger = "costs.jsonl"
/// event_log = "events.jsonl"
/// working_dir = "."               # where shell commands run
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAgentConfig {
    /// Model pool of the root agent
    pub models: Vec<String>,
    /// Granted capability groups
    pub capabilities: Vec<String>,
    /// Spending limit as a decimal string
    pub budget: Option<String>,
    pub state_dir: Option<PathBuf>,
    pub cost_ledger: Option<PathBuf>,
    pub event_log: Option<PathBuf>,
    pub working_dir: Option<PathBuf>,
}

impl Default for FileAgentConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            capabilities: vec!["hierarchy".to_string(), "local_execution".to_string()],
            budget: None,
            state_dir: None,
            cost_ledger: None,
            event_log: None,
            working_dir: None,
        }
    }
}

impl FileAgentConfig {
    /// Parse the model pool, dropping empty names.
    pub fn parse_models(&self) -> (Vec<ModelId>, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let mut models = Vec::new();
        for (i, name) in self.models.iter().enumerate() {
            if name.trim().is_empty() {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::EmptyModelName {
                        field: format!("agent.models[{}]", i),
                    },
                    format!("agent.models[{}]: model name cannot be empty", i),
                ));
            } else {
                models.push(ModelId::from(name.trim()));
            }
        }
        if models.is_empty() {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::EmptyPool,
                "agent.models: no models configured, pass --model on the command line",
            ));
        }
        (models, issues)
    }

    /// Parse capability group names, skipping unknown ones.
    pub fn parse_capabilities(&self) -> (BTreeSet<CapabilityGroup>, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        let mut groups = BTreeSet::new();
        for name in &self.capabilities {
            match serde_json::from_value::<CapabilityGroup>(serde_json::Value::String(name.clone())) {
                Ok(group) => {
                    groups.insert(group);
                }
                Err(_) => issues.push(ConfigIssue::warning(
                    ConfigIssueCode::InvalidEnumValue {
                        field: "agent.capabilities".to_string(),
                        value: name.clone(),
                        valid_values: vec![
                            "hierarchy".to_string(),
                            "local_execution".to_string(),
                            "external_api".to_string(),
                            "mcp".to_string(),
                        ],
                    },
                    format!("agent.capabilities: unknown group '{}', ignored", name),
                )),
            }
        }
        (groups, issues)
    }

    /// Root budget. Without a `budget` the agent is not budget-tracked.
    pub fn parse_budget(&self) -> (BudgetState, Vec<ConfigIssue>) {
        let Some(raw) = &self.budget else {
            return (BudgetState::na(), vec![]);
        };
        match Decimal::from_str(raw.trim()) {
            Ok(limit) if limit >= Decimal::ZERO => (BudgetState::root(Some(limit)), vec![]),
            _ => {
                let issue = ConfigIssue::error(
                    ConfigIssueCode::InvalidAmount {
                        field: "agent.budget".to_string(),
                        value: raw.clone(),
                    },
                    format!("agent.budget: '{}' is not a non-negative decimal amount", raw),
                );
                (BudgetState::na(), vec![issue])
            }
        }
    }
}
