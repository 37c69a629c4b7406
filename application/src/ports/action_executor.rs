//! Action executor port
//!
//! Executes the externally-implemented actions (shell commands, HTTP
//! fetches, MCP tool calls, ...). The runtime runs every execution inside a
//! router task, so implementations may take as long as they need.
//!
//! Long-running commands return [`Execution::Started`] with a
//! [`CommandHandle`]; the router keeps the handle in its command table and
//! answers later status and termination requests from it.

use async_trait::async_trait;
use conclave_domain::{ActionId, AgentId, TaskId};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    #[error("command_not_found: {0}")]
    CommandNotFound(String),

    #[error("Unsupported action: {0}")]
    Unsupported(String),

    #[error("Action not permitted: {0}")]
    NotPermitted(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Execution failed: {0}")]
    Failed(String),

    #[error("Cancelled")]
    Cancelled,
}

/// One dispatched action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub action_id: ActionId,
    pub action: String,
    pub params: Value,
    pub agent_id: AgentId,
    pub task_id: TaskId,
}

/// Observable state of a long-running command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CommandStatus {
    Running { output: String },
    Exited { code: Option<i32>, output: String },
    Terminated { output: String },
    Failed { reason: String },
}

impl CommandStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, CommandStatus::Running { .. })
    }

    pub fn to_json(&self, correlation_id: &str) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let Value::Object(map) = &mut value {
            map.insert("command_id".to_string(), Value::String(correlation_id.to_string()));
        }
        value
    }
}

/// Handle to a running command, held in a router's command table
#[derive(Debug, Clone)]
pub struct CommandHandle {
    pub status: watch::Receiver<CommandStatus>,
    pub cancel: CancellationToken,
}

impl CommandHandle {
    pub fn current(&self) -> CommandStatus {
        self.status.borrow().clone()
    }

    /// Wait for the command to finish and return its final status.
    pub async fn finished(mut self) -> CommandStatus {
        let finished = self
            .status
            .wait_for(CommandStatus::is_finished)
            .await
            .map(|status| status.clone());
        match finished {
            Ok(status) => status,
            // sender dropped; the last published status is final
            Err(_) => self.status.borrow().clone(),
        }
    }
}

/// Outcome of starting an action
#[derive(Debug)]
pub enum Execution {
    /// Finished with a single result
    Completed(Value),
    /// Still running in the background; `result` is reported now and
    /// carries `correlation_id` so the model can ask about it later
    Started {
        correlation_id: String,
        command: CommandHandle,
        result: Value,
    },
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Whether this executor implements `action`.
    fn supports(&self, action: &str) -> bool;

    async fn execute(&self, request: &ActionRequest) -> Result<Execution, ActionError>;
}

/// Executor that supports nothing; every external action fails.
pub struct NoActions;

#[async_trait]
impl ActionExecutor for NoActions {
    fn supports(&self, _action: &str) -> bool {
        false
    }

    async fn execute(&self, request: &ActionRequest) -> Result<Execution, ActionError> {
        Err(ActionError::Unsupported(request.action.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_json_carries_command_id() {
        let status = CommandStatus::Exited {
            code: Some(0),
            output: "ok".to_string(),
        };
        let value = status.to_json("cid-1");
        assert_eq!(value["status"], "exited");
        assert_eq!(value["code"], 0);
        assert_eq!(value["command_id"], "cid-1");
    }

    #[tokio::test]
    async fn test_handle_waits_for_finish() {
        let (tx, rx) = watch::channel(CommandStatus::Running {
            output: String::new(),
        });
        let handle = CommandHandle {
            status: rx,
            cancel: CancellationToken::new(),
        };
        assert!(!handle.current().is_finished());

        let waiter = tokio::spawn(handle.clone().finished());
        tx.send(CommandStatus::Terminated {
            output: "bye".to_string(),
        })
        .unwrap();
        assert_eq!(
            waiter.await.unwrap(),
            CommandStatus::Terminated {
                output: "bye".to_string()
            }
        );
    }
}
