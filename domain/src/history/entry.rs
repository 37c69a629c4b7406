//! History entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of a history entry.
///
/// `User`, `Event`, `Result` and `Prompt` render as user-role messages;
/// `Assistant` and `Decision` render as assistant-role messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    User,
    Assistant,
    Decision,
    Result,
    Event,
    Prompt,
}

impl EntryKind {
    /// Whether this kind is spoken by the model itself.
    pub fn is_assistant_role(&self) -> bool {
        matches!(self, EntryKind::Assistant | EntryKind::Decision)
    }
}

/// One immutable entry in a model's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub kind: EntryKind,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl HistoryEntry {
    pub fn new(kind: EntryKind, content: impl Into<Value>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp: Utc::now(),
            action_type: None,
            sender: None,
        }
    }

    /// A message from a user, parent or child agent.
    pub fn message(sender: impl Into<String>, content: impl Into<String>) -> Self {
        let mut entry = Self::new(EntryKind::User, Value::String(content.into()));
        entry.sender = Some(sender.into());
        entry
    }

    /// A decision taken by consensus.
    pub fn decision(action: &str, params: &Value, reasoning: &str) -> Self {
        let content = serde_json::json!({
            "action": action,
            "params": params,
            "reasoning": reasoning,
        });
        Self::new(EntryKind::Decision, content).with_action_type(action)
    }

    /// The outcome of a dispatched action.
    pub fn result(action: &str, content: impl Into<Value>) -> Self {
        Self::new(EntryKind::Result, content).with_action_type(action)
    }

    /// A runtime event such as a spawn failure or a failed cycle.
    pub fn event(content: impl Into<String>) -> Self {
        Self::new(EntryKind::Event, Value::String(content.into()))
    }

    pub fn with_action_type(mut self, action: impl Into<String>) -> Self {
        self.action_type = Some(action.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The content as plain text; structured content is rendered as compact JSON.
    pub fn text(&self) -> String {
        match &self.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }

    /// Display form used both for prompting and for token counting.
    ///
    /// Decisions render as `action + params + reasoning`. A decision whose
    /// content does not have that shape falls back to its raw text.
    pub fn display_text(&self) -> String {
        if self.kind != EntryKind::Decision {
            return self.text();
        }
        let Some(obj) = self.content.as_object() else {
            return self.text();
        };
        let Some(action) = obj.get("action").and_then(Value::as_str) else {
            return self.text();
        };
        let params = obj
            .get("params")
            .map(Value::to_string)
            .unwrap_or_else(|| "{}".to_string());
        let reasoning = obj.get("reasoning").and_then(Value::as_str).unwrap_or("");
        format!("action: {}\nparams: {}\nreasoning: {}", action, params, reasoning)
    }
}
