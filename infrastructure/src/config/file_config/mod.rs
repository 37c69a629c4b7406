//! Raw TOML configuration data types
//!
//! These structs mirror the config file exactly. Every section defaults to
//! the runtime defaults, so an empty file is a valid configuration.

mod agent;
mod consensus;
mod memory;
mod runtime;

pub use agent::FileAgentConfig;
pub use consensus::{FileConsensusConfig, FileTemperatureConfig};
pub use memory::{FileCondensationConfig, FileContextConfig, FileLessonsConfig};
pub use runtime::FileRuntimeConfig;

use crate::config::validation::ConfigIssue;
use conclave_application::RuntimeConfig;
use serde::{Deserialize, Serialize};

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Consensus protocol
    pub consensus: FileConsensusConfig,
    /// Per-model temperature ceilings
    pub temperature: FileTemperatureConfig,
    /// History condensation
    pub condensation: FileCondensationConfig,
    /// Lesson accumulation
    pub lessons: FileLessonsConfig,
    /// Context window sizes
    pub context: FileContextConfig,
    /// Retry and shutdown timings
    pub runtime: FileRuntimeConfig,
    /// Root agent started by the CLI
    pub agent: FileAgentConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        issues.extend(self.consensus.validate());
        issues.extend(self.temperature.validate());
        issues.extend(self.condensation.validate());
        issues.extend(self.lessons.validate());
        issues.extend(self.context.validate());
        issues.extend(self.agent.parse_models().1);
        issues.extend(self.agent.parse_capabilities().1);
        issues.extend(self.agent.parse_budget().1);
        issues
    }

    /// Build the runtime configuration. Invalid values fall back the same
    /// way [`validate`](Self::validate) reports them.
    pub fn to_runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            consensus: self.consensus.to_params(),
            temperature: self.temperature.to_schedule(),
            condensation: self.condensation.to_params(),
            lessons: self.lessons.to_params(),
            context_limits: self.context.to_limits(),
            retry_delay: self.runtime.retry_delay(),
            router_shutdown_timeout: self.runtime.router_shutdown_timeout(),
            command_retention: self.runtime.command_retention(),
        }
    }
}
