//! The agent actor
//!
//! One task per agent owns all of its state and processes one mailbox
//! message at a time. Anything slow runs elsewhere and reports back
//! through the mailbox:
//!
//! - consensus cycles and pool switches run as a single background job
//!   whose completion is selected alongside the mailbox
//! - external actions run in router tasks
//! - budget refreshes, persistence and wait timers run in small tasks
//!
//! The loop itself only ever waits for the next message or the job.

use super::batcher::{Admission, EventBatcher, Step, TriggerOutcome};
use super::dispatch::DispatchTracker;
use super::handle::AgentHandle;
use super::mailbox::Mailbox;
use super::messages::{AgentMessage, AgentSnapshot, QueuedMessage};
use super::runtime::{AgentRuntime, AgentServices, AgentSpec};
use crate::ports::action_executor::ActionError;
use crate::ports::broadcaster::BroadcastEvent;
use crate::services::{
    AgentMemory, ConsensusOutcome, PoolTransfer, StateTransferError, apply_committed,
};
use conclave_domain::action::catalog::EXECUTE_SHELL;
use conclave_domain::{
    ActionId, AgentId, BudgetState, CapabilityGroup, CostAccumulator, CostContext, HistoryEntry,
    ModelId, TaskId, TodoItem,
};
use futures::future::OptionFuture;
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// A child this agent spawned
#[derive(Debug, Clone)]
pub(super) struct ChildEntry {
    pub handle: AgentHandle,
    pub task: String,
}

/// Result of the background job
pub(super) enum JobOutcome {
    Cycle(ConsensusOutcome),
    Transfer {
        result: Result<PoolTransfer, StateTransferError>,
        costs: CostAccumulator,
    },
}

enum Flow {
    Continue,
    Stop,
}

enum Event {
    Job(Result<JobOutcome, JoinError>),
    Message(AgentMessage),
}

pub(crate) struct AgentActor {
    pub(super) agent_id: AgentId,
    pub(super) task_id: TaskId,
    pub(super) task: String,
    pub(super) parent: Option<AgentHandle>,
    pub(super) capabilities: BTreeSet<CapabilityGroup>,
    /// Own handle, given to children as their parent
    pub(super) me: AgentHandle,
    pub(super) runtime: AgentRuntime,
    pub(super) memory: AgentMemory,
    pub(super) budget: BudgetState,
    pub(super) todos: Vec<TodoItem>,
    pub(super) children: BTreeMap<AgentId, ChildEntry>,
    pub(super) batcher: EventBatcher,
    pub(super) dispatch: DispatchTracker,
    pub(super) mailbox: Mailbox,
    pub(super) job: Option<JoinHandle<JobOutcome>>,
    pub(super) pending_switch: Option<oneshot::Sender<Result<(), StateTransferError>>>,
    pub(super) timer: Option<JoinHandle<()>>,
    pub(super) persisting: Option<JoinHandle<()>>,
    pub(super) refreshing: Option<JoinHandle<()>>,
    pub(super) cycles: u64,
}

impl AgentActor {
    pub(super) fn new(
        spec: AgentSpec,
        pool: Vec<ModelId>,
        mailbox: Mailbox,
        runtime: AgentRuntime,
        me: AgentHandle,
    ) -> Self {
        Self {
            agent_id: spec.agent_id,
            task_id: spec.task_id,
            task: spec.task,
            parent: spec.parent,
            capabilities: spec.capabilities,
            me,
            runtime,
            memory: AgentMemory::new(pool),
            budget: spec.budget,
            todos: Vec::new(),
            children: BTreeMap::new(),
            batcher: EventBatcher::new(),
            dispatch: DispatchTracker::new(),
            mailbox,
            job: None,
            pending_switch: None,
            timer: None,
            persisting: None,
            refreshing: None,
            cycles: 0,
        }
    }

    pub(super) fn services(&self) -> &AgentServices {
        self.runtime.services()
    }

    pub(crate) async fn run(mut self) {
        self.restore().await;
        self.broadcast("agent_started", json!({"task": self.task, "pool": self.memory.pool}));

        loop {
            let event = tokio::select! {
                Some(joined) = OptionFuture::from(self.job.as_mut()) => Event::Job(joined),
                message = self.mailbox.recv() => Event::Message(message),
            };
            match event {
                Event::Job(joined) => {
                    self.job = None;
                    self.on_job_finished(joined);
                }
                Event::Message(message) => {
                    if let Flow::Stop = self.handle(message).await {
                        break;
                    }
                }
            }
        }

        self.broadcast("agent_stopped", json!({"cycles": self.cycles}));
        info!(agent_id = %self.agent_id, cycles = self.cycles, "Agent stopped");
    }

    async fn restore(&mut self) {
        let store = self.services().store.clone();
        match store.restore(&self.agent_id).await {
            Ok(saved) => {
                let pool = self.memory.pool.clone();
                self.memory = AgentMemory::restored(pool, saved);
            }
            Err(e) => warn!(agent_id = %self.agent_id, "Could not restore saved state, starting empty: {}", e),
        }
    }

    async fn handle(&mut self, message: AgentMessage) -> Flow {
        match message {
            AgentMessage::External { sender, content } => {
                let entry = HistoryEntry::message(sender.clone(), content);
                self.on_external(sender, entry);
            }
            AgentMessage::ActionResult { action_id, result } => self.on_action_result(action_id, result),
            AgentMessage::CommandRegistered {
                monitor,
                correlation_id,
            } => {
                self.dispatch.register_command(monitor, correlation_id);
            }
            AgentMessage::CommandFinished {
                correlation_id,
                status,
            } => {
                let entry = HistoryEntry::result(EXECUTE_SHELL, status.to_json(&correlation_id));
                self.on_external(format!("command:{}", correlation_id), entry);
            }
            AgentMessage::SpawnFailed { child, reason } => self.on_spawn_failed(child, reason),
            AgentMessage::Trigger => {
                let outcome = self.batcher.on_trigger();
                self.on_trigger(outcome);
            }
            AgentMessage::WaitTimerFired { generation } => {
                let outcome = self.batcher.on_timer(generation);
                self.on_trigger(outcome);
            }
            AgentMessage::BudgetUpdated { committed } => self.on_budget(committed),
            AgentMessage::RouterDown { monitor } => {
                for action_id in self.dispatch.router_down(monitor) {
                    warn!(agent_id = %self.agent_id, monitor = %monitor, action_id = %action_id, "Router stopped without a result");
                    self.on_action_result(action_id, Err(ActionError::Failed("router terminated".to_string())));
                }
            }
            AgentMessage::SwitchPool { pool, reply } => self.on_switch_pool(pool, reply),
            AgentMessage::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            AgentMessage::Shutdown { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    fn on_external(&mut self, sender: String, entry: HistoryEntry) {
        let message = QueuedMessage::new(sender, entry);
        match self.batcher.admit(message, self.dispatch.pending_len()) {
            Admission::Immediate(message) => {
                self.memory.push_all(message.entry);
                self.mailbox.emit_trigger();
            }
            Admission::Queued => {
                debug!(agent_id = %self.agent_id, queued = self.batcher.queued(), "Agent busy, message queued");
            }
        }
    }

    fn on_action_result(&mut self, action_id: ActionId, result: Result<Value, ActionError>) {
        let Some(action) = self.dispatch.complete(&action_id) else {
            debug!(agent_id = %self.agent_id, action_id = %action_id, "Result for an unknown action ignored");
            return;
        };
        let succeeded = result.is_ok();
        let content = match result {
            Ok(value) => value,
            Err(e) => json!({"error": e.to_string()}),
        };
        debug!(agent_id = %self.agent_id, action_id = %action_id, succeeded, "Action result: {}", action.action_type);
        self.memory.push_all(HistoryEntry::result(&action.action_type, content));

        let continues = action.continues_after(succeeded);
        if !continues && let Some(seconds) = action.wait.timer_seconds() {
            self.arm_timer(Duration::from_secs(seconds));
        }
        let step = self.batcher.on_result(continues, self.dispatch.pending_len());
        self.apply(step);
    }

    fn on_spawn_failed(&mut self, child: AgentId, reason: String) {
        if self.children.remove(&child).is_some() {
            debug!(agent_id = %self.agent_id, child = %child, "Removed failed child");
        }
        warn!(agent_id = %self.agent_id, child = %child, "Child agent failed: {}", reason);
        self.memory
            .push_all(HistoryEntry::event(format!("Child agent {} failed: {}", child, reason)));
        let step = self.batcher.on_spawn_failure();
        self.apply(step);
    }

    fn on_trigger(&mut self, outcome: TriggerOutcome) {
        match outcome {
            TriggerOutcome::Stale => debug!(agent_id = %self.agent_id, "Stale trigger ignored"),
            TriggerOutcome::Deferred => {
                debug!(agent_id = %self.agent_id, "Trigger deferred until the running job ends")
            }
            TriggerOutcome::Run {
                flushed,
                cancelled_timer,
            } => {
                if cancelled_timer {
                    self.cancel_timer_task();
                }
                let drained = self.mailbox.drain_triggers();
                let flushed_count = flushed.len();
                for message in flushed {
                    self.memory.push_all(message.entry);
                }
                debug!(agent_id = %self.agent_id, drained, flushed = flushed_count, "Starting consensus cycle");
                self.start_cycle();
            }
        }
    }

    fn on_budget(&mut self, committed: Option<Decimal>) {
        if apply_committed(&mut self.budget, committed) {
            let over = self.budget.over_budget();
            info!(agent_id = %self.agent_id, over_budget = over, committed = %self.budget.committed, "Budget status changed");
            self.broadcast("budget", json!({"over_budget": over, "committed": self.budget.committed}));
        }
    }

    fn on_job_finished(&mut self, joined: Result<JobOutcome, JoinError>) {
        match joined {
            Ok(JobOutcome::Cycle(outcome)) => self.finish_cycle(outcome),
            Ok(JobOutcome::Transfer { result, costs }) => self.finish_transfer(result, costs),
            Err(e) => {
                if self.pending_switch.take().is_some() {
                    warn!(agent_id = %self.agent_id, "Pool switch task failed: {}", e);
                } else {
                    self.record_cycle_failure(&format!("cycle task failed: {}", e));
                }
            }
        }
        let step = self.batcher.finish_job(self.dispatch.pending_len());
        self.apply(step);
    }

    pub(super) fn apply(&mut self, step: Step) {
        if step == Step::EmitTrigger {
            self.mailbox.emit_trigger();
        }
    }

    /// Arm the wait timer, replacing any outstanding one.
    pub(super) fn arm_timer(&mut self, delay: Duration) {
        self.cancel_timer_task();
        let generation = self.batcher.arm_timer();
        let tx = self.mailbox.sender();
        debug!(agent_id = %self.agent_id, generation, "Wait timer armed for {:?}", delay);
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(AgentMessage::WaitTimerFired { generation });
        }));
    }

    fn cancel_timer_task(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub(super) fn cost_context(&self, purpose: &str) -> CostContext {
        CostContext::new(self.agent_id.clone(), self.task_id.clone(), purpose)
    }

    pub(super) fn broadcast(&self, event_type: &'static str, payload: Value) {
        self.services()
            .broadcaster
            .broadcast(BroadcastEvent::new(event_type, payload).for_agent(&self.agent_id, &self.task_id));
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            agent_id: self.agent_id.clone(),
            task_id: self.task_id.clone(),
            parent: self.parent.as_ref().map(|p| p.id().clone()),
            pool: self.memory.pool.clone(),
            histories: self.memory.histories.to_map(),
            lessons: self.memory.lessons.clone(),
            working_states: self.memory.working_states.clone(),
            todos: self.todos.clone(),
            children: self.children.keys().cloned().collect(),
            budget: self.budget.clone(),
            pending_actions: self.dispatch.pending_len(),
            queued_messages: self.batcher.queued(),
            scheduled: self.batcher.is_scheduled(),
            timer_armed: self.batcher.timer_armed(),
            job_running: self.batcher.job_running(),
            cycles: self.cycles,
        }
    }

    async fn shutdown(&mut self) {
        info!(agent_id = %self.agent_id, "Shutting down");
        self.cancel_timer_task();
        if let Some(job) = self.job.take() {
            job.abort();
        }
        self.pending_switch = None;

        let timeout = self.services().config.router_shutdown_timeout;
        self.dispatch.shutdown(timeout).await;

        for (_, child) in std::mem::take(&mut self.children) {
            if child.handle.request_shutdown().is_err() {
                debug!(agent_id = %self.agent_id, child = %child.handle.id(), "Child already stopped");
            }
        }
        self.persist_now().await;
    }
}
