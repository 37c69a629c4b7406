//! Messages processed by an agent actor

use super::router::MonitorRef;
use crate::ports::action_executor::{ActionError, CommandStatus};
use crate::services::StateTransferError;
use chrono::{DateTime, Utc};
use conclave_domain::{
    ActionId, AgentId, BudgetState, ContextLessons, HistoryEntry, ModelHistory, ModelId, TaskId,
    TodoItem, WorkingStates,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// Everything that can arrive in an agent's mailbox.
#[derive(Debug)]
pub enum AgentMessage {
    /// A message from the user, the parent or a child
    External { sender: String, content: String },
    /// Outcome of a dispatched action
    ActionResult {
        action_id: ActionId,
        result: Result<Value, ActionError>,
    },
    /// A router started a command that accepts follow-up requests
    CommandRegistered {
        monitor: MonitorRef,
        correlation_id: String,
    },
    /// A background command reached a final state
    CommandFinished {
        correlation_id: String,
        status: CommandStatus,
    },
    /// A child agent could not be started or crashed
    SpawnFailed { child: AgentId, reason: String },
    /// Run a consensus cycle if an obligation is outstanding
    Trigger,
    WaitTimerFired { generation: u64 },
    /// Fresh committed spend; `None` when it could not be read
    BudgetUpdated { committed: Option<Decimal> },
    RouterDown { monitor: MonitorRef },
    SwitchPool {
        pool: Vec<ModelId>,
        reply: oneshot::Sender<Result<(), StateTransferError>>,
    },
    Snapshot {
        reply: oneshot::Sender<AgentSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl AgentMessage {
    pub fn is_trigger(&self) -> bool {
        matches!(self, AgentMessage::Trigger)
    }
}

/// External event held back while the agent is busy
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub sender_id: String,
    pub entry: HistoryEntry,
    pub queued_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(sender_id: impl Into<String>, entry: HistoryEntry) -> Self {
        Self {
            sender_id: sender_id.into(),
            entry,
            queued_at: Utc::now(),
        }
    }
}

/// Point-in-time view of an agent, answered from inside its loop.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub parent: Option<AgentId>,
    pub pool: Vec<ModelId>,
    pub histories: BTreeMap<ModelId, ModelHistory>,
    pub lessons: ContextLessons,
    pub working_states: WorkingStates,
    pub todos: Vec<TodoItem>,
    pub children: Vec<AgentId>,
    pub budget: BudgetState,
    pub pending_actions: usize,
    pub queued_messages: usize,
    pub scheduled: bool,
    pub timer_armed: bool,
    pub job_running: bool,
    pub cycles: u64,
}

impl AgentSnapshot {
    /// Nothing in flight and nothing owed. An armed wait timer still
    /// counts as idle.
    pub fn is_idle(&self) -> bool {
        self.pending_actions == 0 && self.queued_messages == 0 && !self.scheduled && !self.job_running
    }

    pub fn history(&self, model: &str) -> Option<&ModelHistory> {
        self.histories.get(&ModelId::from(model))
    }
}
