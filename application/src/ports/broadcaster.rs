//! Port for best-effort observability broadcasts.
//!
//! Defines the [`Broadcaster`] trait for publishing agent events (decisions,
//! user-visible messages, failures) to an outside observer such as a UI or a
//! JSONL transcript.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostics, while this port carries the machine-readable
//! event stream. Nothing in the runtime depends on a broadcast arriving.

use conclave_domain::{AgentId, TaskId};
use serde_json::Value;

/// A structured agent event.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEvent {
    /// Event type identifier (e.g., "decision", "user_message", "cycle_failed").
    pub event_type: &'static str,
    pub agent_id: Option<AgentId>,
    pub task_id: Option<TaskId>,
    /// JSON payload with event-specific data.
    pub payload: Value,
}

impl BroadcastEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            agent_id: None,
            task_id: None,
            payload,
        }
    }

    pub fn for_agent(mut self, agent_id: &AgentId, task_id: &TaskId) -> Self {
        self.agent_id = Some(agent_id.clone());
        self.task_id = Some(task_id.clone());
        self
    }
}

/// Port for broadcasting agent events.
///
/// `broadcast` is synchronous and infallible so it can never disrupt the
/// decision loop; implementations drop events they cannot deliver.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, event: BroadcastEvent);
}

/// No-op implementation for tests and when broadcasting is disabled.
pub struct NoBroadcast;

impl Broadcaster for NoBroadcast {
    fn broadcast(&self, _event: BroadcastEvent) {}
}
