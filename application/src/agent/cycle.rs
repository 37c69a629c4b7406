//! Background jobs of an agent: consensus cycles and pool switches, plus
//! what follows them (budget refresh and persistence).

use super::actor::{AgentActor, JobOutcome};
use super::messages::AgentMessage;
use crate::ports::persistence::StateStore;
use crate::services::{ConsensusInput, ConsensusOutcome, PoolTransfer, StateTransferError};
use conclave_domain::prompt::{ChildSummary, budget_block, children_block, todo_block};
use conclave_domain::{AgentId, ContextBlocks, ContextMemory, CostAccumulator, CostRecord, HistoryEntry, ModelId};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

impl AgentActor {
    pub(super) fn context_blocks(&self) -> ContextBlocks {
        let children: Vec<ChildSummary> = self
            .children
            .iter()
            .map(|(agent_id, child)| ChildSummary {
                agent_id: agent_id.clone(),
                task: child.task.clone(),
            })
            .collect();
        ContextBlocks {
            // per model, added by the query engine
            ace: None,
            todo: todo_block(&self.todos),
            children: children_block(&children),
            budget: budget_block(&self.budget),
        }
    }

    pub(super) fn start_cycle(&mut self) {
        let input = ConsensusInput {
            slices: self.memory.slices(),
            blocks: self.context_blocks(),
            cost_context: Some(self.cost_context("consensus")),
            force_condense: false,
        };
        let consensus = self.services().consensus.clone();
        debug!(agent_id = %self.agent_id, models = input.slices.len(), "Consensus cycle started");
        self.job = Some(tokio::spawn(async move { JobOutcome::Cycle(consensus.run(input).await) }));
    }

    pub(super) fn finish_cycle(&mut self, outcome: ConsensusOutcome) {
        let ConsensusOutcome {
            result,
            slices,
            mut costs,
            rounds,
        } = outcome;
        let memory_changed = self.memory.apply_slices(slices);
        self.cycles += 1;

        match result {
            Ok(decision) => {
                info!(
                    agent_id = %self.agent_id,
                    rounds,
                    supporters = decision.supporters.len(),
                    "Decided '{}' ({:?})",
                    decision.proposal.action,
                    decision.kind
                );
                self.dispatch_decision(decision);
            }
            Err(e) => self.record_cycle_failure(&e.to_string()),
        }

        self.refresh_budget(costs.drain());
        if memory_changed {
            self.persist();
        }
    }

    /// Record a failed cycle in every history and retry after the
    /// configured delay.
    pub(super) fn record_cycle_failure(&mut self, reason: &str) {
        warn!(agent_id = %self.agent_id, "Consensus cycle failed: {}", reason);
        self.memory
            .push_all(HistoryEntry::event(format!("Consensus cycle failed: {}", reason)));
        self.broadcast("cycle_failed", json!({"reason": reason}));
        let delay = self.services().config.retry_delay;
        self.arm_timer(delay);
    }

    /// Flush `records` and report the fresh committed spend to the mailbox.
    /// Refreshes are chained so readings arrive in the order they were taken.
    pub(super) fn refresh_budget(&mut self, records: Vec<CostRecord>) {
        let tracker = self.services().budget.clone();
        let tx = self.mailbox.sender();
        let agent_id = self.agent_id.clone();
        let previous = self.refreshing.take();
        self.refreshing = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let committed = tracker.record(&agent_id, records).await;
            let _ = tx.send(AgentMessage::BudgetUpdated { committed });
        }));
    }

    /// Persist in the background. Writes are chained so they land in order.
    pub(super) fn persist(&mut self) {
        let store = self.services().store.clone();
        let memory = self.memory.to_context_memory();
        let agent_id = self.agent_id.clone();
        let previous = self.persisting.take();
        self.persisting = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            save(store.as_ref(), &agent_id, &memory).await;
        }));
    }

    pub(super) async fn persist_now(&mut self) {
        if let Some(previous) = self.persisting.take() {
            let _ = previous.await;
        }
        let store = self.services().store.clone();
        save(store.as_ref(), &self.agent_id, &self.memory.to_context_memory()).await;
    }

    pub(super) fn on_switch_pool(
        &mut self,
        pool: Vec<ModelId>,
        reply: oneshot::Sender<Result<(), StateTransferError>>,
    ) {
        if self.batcher.job_running() {
            let _ = reply.send(Err(StateTransferError::CycleInFlight));
            return;
        }
        // rejected pools never occupy the job slot
        if let Err(e) = self.services().transfer.validate(&pool) {
            debug!(agent_id = %self.agent_id, "Pool switch rejected: {}", e);
            let _ = reply.send(Err(e));
            return;
        }

        let transfer = self.services().transfer.clone();
        let current = self.memory.clone();
        let cost_context = self.cost_context("pool_switch");
        self.batcher.start_job();
        self.pending_switch = Some(reply);
        self.job = Some(tokio::spawn(async move {
            let mut costs = CostAccumulator::new();
            let result = transfer
                .switch_pool(&current, &pool, Some(&cost_context), &mut costs)
                .await;
            JobOutcome::Transfer { result, costs }
        }));
    }

    pub(super) fn finish_transfer(
        &mut self,
        result: Result<PoolTransfer, StateTransferError>,
        mut costs: CostAccumulator,
    ) {
        let response = match result {
            Ok(PoolTransfer { mut memory, donor }) => {
                // entries appended while the switch ran
                if let Some(live) = donor.as_ref().and_then(|d| self.memory.histories.get(d)) {
                    memory.rebase_onto(live);
                }
                info!(agent_id = %self.agent_id, pool = ?memory.pool, donor = ?donor, "Model pool switched");
                self.broadcast("pool_switched", json!({"pool": memory.pool, "donor": donor}));
                self.memory = memory;
                self.persist();
                Ok(())
            }
            Err(e) => {
                warn!(agent_id = %self.agent_id, "Pool switch failed, keeping the current pool: {}", e);
                Err(e)
            }
        };
        if let Some(reply) = self.pending_switch.take() {
            let _ = reply.send(response);
        }
        self.refresh_budget(costs.drain());
    }
}

async fn save(store: &dyn StateStore, agent_id: &AgentId, memory: &ContextMemory) {
    match store.persist(agent_id, memory).await {
        Ok(()) => debug!(agent_id = %agent_id, "Memory persisted"),
        Err(e) => warn!(agent_id = %agent_id, "Could not persist memory: {}", e),
    }
}
