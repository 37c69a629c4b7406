//! Agent identifiers and capability groups

use crate::action::catalog;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Unique identifier of a long-lived agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the task tree an agent belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Category of actions an agent may be granted.
///
/// `orient`, `wait`, `todo` and `send_message` are always available; every
/// other action needs the group that contains it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityGroup {
    /// Spawning and dismissing child agents
    Hierarchy,
    /// Shell commands on the local machine
    LocalExecution,
    /// Web fetch, search and external HTTP APIs
    ExternalApi,
    /// Tools exposed by MCP servers
    Mcp,
}

impl CapabilityGroup {
    pub fn all() -> BTreeSet<CapabilityGroup> {
        [
            CapabilityGroup::Hierarchy,
            CapabilityGroup::LocalExecution,
            CapabilityGroup::ExternalApi,
            CapabilityGroup::Mcp,
        ]
        .into_iter()
        .collect()
    }

    /// Group required for `action`, `None` for always-available actions.
    pub fn required_for(action: &str) -> Option<CapabilityGroup> {
        match action {
            catalog::ORIENT | catalog::WAIT | catalog::TODO | catalog::SEND_MESSAGE => None,
            catalog::SPAWN_CHILD | catalog::DISMISS_CHILD => Some(CapabilityGroup::Hierarchy),
            catalog::EXECUTE_SHELL => Some(CapabilityGroup::LocalExecution),
            catalog::CALL_MCP => Some(CapabilityGroup::Mcp),
            _ => Some(CapabilityGroup::ExternalApi),
        }
    }

    /// Whether `granted` allows `action`.
    pub fn allows(granted: &BTreeSet<CapabilityGroup>, action: &str) -> bool {
        Self::required_for(action).is_none_or(|group| granted.contains(&group))
    }
}
