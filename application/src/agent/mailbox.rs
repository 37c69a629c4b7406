//! Agent mailbox
//!
//! An unbounded channel plus a local backlog. Messages already delivered to
//! the channel are pulled into the backlog whenever the actor needs to look
//! at (or append behind) everything that is waiting, so a trigger emitted
//! by the actor always lands after messages that arrived before it.

use super::messages::AgentMessage;
use std::collections::VecDeque;
use tokio::sync::mpsc;

pub struct Mailbox {
    rx: mpsc::UnboundedReceiver<AgentMessage>,
    tx: mpsc::UnboundedSender<AgentMessage>,
    backlog: VecDeque<AgentMessage>,
}

impl Mailbox {
    pub fn new(rx: mpsc::UnboundedReceiver<AgentMessage>, tx: mpsc::UnboundedSender<AgentMessage>) -> Self {
        Self {
            rx,
            tx,
            backlog: VecDeque::new(),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<AgentMessage> {
        self.tx.clone()
    }

    /// Next message, backlog first. Cancel safe.
    pub async fn recv(&mut self) -> AgentMessage {
        if let Some(message) = self.backlog.pop_front() {
            return message;
        }
        match self.rx.recv().await {
            Some(message) => message,
            // `self.tx` keeps the channel open
            None => std::future::pending::<AgentMessage>().await,
        }
    }

    /// Deliver a message behind everything already waiting.
    pub fn push(&mut self, message: AgentMessage) {
        self.pull();
        self.backlog.push_back(message);
    }

    pub fn emit_trigger(&mut self) {
        self.push(AgentMessage::Trigger);
    }

    /// Discard every waiting trigger; other messages keep their order.
    pub fn drain_triggers(&mut self) -> usize {
        self.pull();
        let before = self.backlog.len();
        self.backlog.retain(|m| !m.is_trigger());
        before - self.backlog.len()
    }

    pub fn waiting(&mut self) -> usize {
        self.pull();
        self.backlog.len()
    }

    fn pull(&mut self) {
        while let Ok(message) = self.rx.try_recv() {
            self.backlog.push_back(message);
        }
    }
}
