//! Cloneable handle to a running agent

use super::messages::{AgentMessage, AgentSnapshot};
use super::runtime::AgentError;
use conclave_domain::{AgentId, ModelId};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
pub struct AgentHandle {
    agent_id: AgentId,
    tx: mpsc::UnboundedSender<AgentMessage>,
}

impl AgentHandle {
    pub(crate) fn new(agent_id: AgentId, tx: mpsc::UnboundedSender<AgentMessage>) -> Self {
        Self { agent_id, tx }
    }

    pub fn id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub(crate) fn send(&self, message: AgentMessage) -> Result<(), AgentError> {
        self.tx
            .send(message)
            .map_err(|_| AgentError::NotRunning(self.agent_id.clone()))
    }

    /// Deliver a message from `sender` ("user", "parent" or an agent id).
    pub fn send_message(&self, sender: impl Into<String>, content: impl Into<String>) -> Result<(), AgentError> {
        self.send(AgentMessage::External {
            sender: sender.into(),
            content: content.into(),
        })
    }

    pub(crate) fn notify_spawn_failed(&self, child: AgentId, reason: impl Into<String>) -> Result<(), AgentError> {
        self.send(AgentMessage::SpawnFailed {
            child,
            reason: reason.into(),
        })
    }

    pub async fn snapshot(&self) -> Result<AgentSnapshot, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentMessage::Snapshot { reply })?;
        rx.await.map_err(|_| AgentError::NoReply(self.agent_id.clone()))
    }

    /// Replace the model pool. Rejected while a consensus cycle runs.
    pub async fn switch_pool(&self, pool: Vec<ModelId>) -> Result<(), AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentMessage::SwitchPool { pool, reply })?;
        rx.await
            .map_err(|_| AgentError::NoReply(self.agent_id.clone()))?
            .map_err(AgentError::from)
    }

    /// Stop the agent and wait until its routers are down and its memory
    /// is persisted.
    pub async fn shutdown(&self) -> Result<(), AgentError> {
        let (reply, rx) = oneshot::channel();
        self.send(AgentMessage::Shutdown { reply })?;
        rx.await.map_err(|_| AgentError::NoReply(self.agent_id.clone()))
    }

    /// Ask the agent to stop without waiting for it.
    pub fn request_shutdown(&self) -> Result<(), AgentError> {
        let (reply, _) = oneshot::channel();
        self.send(AgentMessage::Shutdown { reply })
    }
}
