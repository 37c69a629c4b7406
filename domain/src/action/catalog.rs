//! Declared semantics of action kinds
//!
//! The concrete action implementations live outside the core; what the
//! decision loop needs to know about each kind is captured by
//! [`ActionTraits`]:
//!
//! | Trait | Effect |
//! |-------|--------|
//! | `mode` | synchronous actions run inside the agent, asynchronous ones in a router |
//! | `self_contained` | produces no external event, so `wait` is forced off |
//! | `untrusted_output` | result text is fenced off as untrusted in prompts |
//! | `follow_up` | supports `check_id` / `terminate_id` follow-up requests |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ORIENT: &str = "orient";
pub const WAIT: &str = "wait";
pub const TODO: &str = "todo";
pub const SEND_MESSAGE: &str = "send_message";
pub const SPAWN_CHILD: &str = "spawn_child";
pub const DISMISS_CHILD: &str = "dismiss_child";
pub const EXECUTE_SHELL: &str = "execute_shell";
pub const FETCH_WEB: &str = "fetch_web";
pub const CALL_API: &str = "call_api";
pub const CALL_MCP: &str = "call_mcp";
pub const SEARCH_WEB: &str = "search_web";

/// How an action completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Completes with a single result, e.g. spawning a child or sending a message
    Synchronous,
    /// Runs in a worker and reports back later
    Asynchronous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTraits {
    pub mode: ExecutionMode,
    pub self_contained: bool,
    pub untrusted_output: bool,
    pub follow_up: bool,
}

impl ActionTraits {
    pub const fn synchronous() -> Self {
        Self {
            mode: ExecutionMode::Synchronous,
            self_contained: false,
            untrusted_output: false,
            follow_up: false,
        }
    }

    pub const fn asynchronous() -> Self {
        Self {
            mode: ExecutionMode::Asynchronous,
            self_contained: false,
            untrusted_output: false,
            follow_up: false,
        }
    }

    pub const fn self_contained(mut self) -> Self {
        self.self_contained = true;
        self
    }

    pub const fn untrusted(mut self) -> Self {
        self.untrusted_output = true;
        self
    }

    pub const fn with_follow_up(mut self) -> Self {
        self.follow_up = true;
        self
    }

    pub fn is_synchronous(&self) -> bool {
        self.mode == ExecutionMode::Synchronous
    }
}

/// Lookup table from action name to its traits.
///
/// Unknown actions are treated as asynchronous with untrusted output, the
/// conservative choice for anything the runtime has not been told about.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCatalog {
    actions: BTreeMap<String, ActionTraits>,
}

impl ActionCatalog {
    pub fn empty() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }

    pub fn with_action(mut self, name: impl Into<String>, traits: ActionTraits) -> Self {
        self.actions.insert(name.into(), traits);
        self
    }

    pub fn traits(&self, name: &str) -> ActionTraits {
        self.actions
            .get(name)
            .copied()
            .unwrap_or(ActionTraits::asynchronous().untrusted())
    }

    pub fn is_known(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::empty()
            .with_action(ORIENT, ActionTraits::synchronous().self_contained())
            .with_action(TODO, ActionTraits::synchronous().self_contained())
            .with_action(WAIT, ActionTraits::synchronous())
            .with_action(SEND_MESSAGE, ActionTraits::synchronous())
            .with_action(SPAWN_CHILD, ActionTraits::synchronous())
            .with_action(DISMISS_CHILD, ActionTraits::synchronous())
            .with_action(
                EXECUTE_SHELL,
                ActionTraits::asynchronous().untrusted().with_follow_up(),
            )
            .with_action(FETCH_WEB, ActionTraits::asynchronous().untrusted())
            .with_action(CALL_API, ActionTraits::asynchronous().untrusted())
            .with_action(CALL_MCP, ActionTraits::asynchronous().untrusted())
            .with_action(SEARCH_WEB, ActionTraits::asynchronous().untrusted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = ActionCatalog::default();
        assert!(catalog.traits(ORIENT).self_contained);
        assert!(catalog.traits(SPAWN_CHILD).is_synchronous());
        assert!(!catalog.traits(SEND_MESSAGE).untrusted_output);
        assert!(catalog.traits(EXECUTE_SHELL).untrusted_output);
        assert!(catalog.traits(EXECUTE_SHELL).follow_up);
        assert!(catalog.traits(FETCH_WEB).untrusted_output);
    }

    #[test]
    fn test_unknown_action_is_conservative() {
        let catalog = ActionCatalog::default();
        let traits = catalog.traits("launch_rocket");
        assert!(!catalog.is_known("launch_rocket"));
        assert_eq!(traits.mode, ExecutionMode::Asynchronous);
        assert!(traits.untrusted_output);
        assert!(!traits.self_contained);
    }
}
