//! In-flight actions

use super::catalog::ActionTraits;
use super::wait::WaitPolicy;
use crate::core::error::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Identifier of one dispatched action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("action-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub action_id: ActionId,
    pub action_type: String,
    pub params: Value,
    pub started_at: DateTime<Utc>,
    pub wait: WaitPolicy,
    pub traits: ActionTraits,
}

impl PendingAction {
    pub fn new(
        action_id: ActionId,
        action_type: impl Into<String>,
        params: Value,
        wait: WaitPolicy,
        traits: ActionTraits,
    ) -> Self {
        Self {
            action_id,
            action_type: action_type.into(),
            params,
            started_at: Utc::now(),
            wait,
            traits,
        }
    }

    /// Whether the loop continues after this action's result.
    ///
    /// A failed action always continues: its error is itself the event the
    /// agent was waiting for, so suppressing continuation would stall it.
    pub fn continues_after(&self, succeeded: bool) -> bool {
        !self.wait.blocks() || !succeeded
    }
}

/// Table of in-flight actions keyed by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingActions {
    actions: BTreeMap<ActionId, PendingAction>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatched action. Reusing an id is rejected.
    pub fn insert(&mut self, action: PendingAction) -> Result<(), DomainError> {
        if self.actions.contains_key(&action.action_id) {
            return Err(DomainError::DuplicateAction(action.action_id.to_string()));
        }
        self.actions.insert(action.action_id.clone(), action);
        Ok(())
    }

    pub fn remove(&mut self, id: &ActionId) -> Option<PendingAction> {
        self.actions.remove(id)
    }

    pub fn get(&self, id: &ActionId) -> Option<&PendingAction> {
        self.actions.get(id)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingAction> {
        self.actions.values()
    }
}
