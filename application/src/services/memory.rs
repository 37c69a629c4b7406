//! Per-agent model memory: histories, lessons and working states keyed by
//! pool member.

use super::query_engine::ModelSlice;
use conclave_domain::{
    ContextLessons, ContextMemory, HistoryEntry, HistoryId, HistoryStore, ModelHistory, ModelId,
    WorkingStates,
};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentMemory {
    pub pool: Vec<ModelId>,
    pub histories: HistoryStore,
    pub lessons: ContextLessons,
    pub working_states: WorkingStates,
}

impl AgentMemory {
    pub fn new(pool: Vec<ModelId>) -> Self {
        let mut histories = HistoryStore::new();
        histories.ensure(&pool);
        Self {
            pool,
            histories,
            lessons: ContextLessons::new(),
            working_states: WorkingStates::new(),
        }
    }

    /// Memory for `pool` seeded from a restored snapshot. Entries for models
    /// outside the pool are dropped; shared histories are shared again.
    pub fn restored(pool: Vec<ModelId>, saved: ContextMemory) -> Self {
        let ContextMemory {
            mut lessons,
            mut working_states,
            mut histories,
            shared,
        } = saved;
        let mut memory = Self::new(Vec::new());
        for model in &pool {
            let history = histories.remove(model).unwrap_or_default();
            memory.histories.insert(model.clone(), history);
            if let Some(l) = lessons.remove(model) {
                memory.lessons.insert(model.clone(), l);
            }
            if let Some(s) = working_states.remove(model) {
                memory.working_states.insert(model.clone(), s);
            }
        }
        for group in &shared {
            memory.histories.share(group);
        }
        memory.pool = pool;
        memory
    }

    pub fn to_context_memory(&self) -> ContextMemory {
        ContextMemory {
            lessons: self.lessons.clone(),
            working_states: self.working_states.clone(),
            histories: self.histories.to_map(),
            shared: self.histories.alias_groups(),
        }
    }

    /// Append `entry` once to every distinct history.
    pub fn push_all(&mut self, entry: HistoryEntry) {
        self.histories.push_all(entry);
    }

    /// Snapshot of every pool member's state, in pool order.
    pub fn slices(&self) -> Vec<ModelSlice> {
        self.pool
            .iter()
            .map(|model| ModelSlice {
                model: model.clone(),
                history: self.histories.get(model).cloned().unwrap_or_default(),
                lessons: self.lessons.get(model).cloned().unwrap_or_default(),
                working_state: self.working_states.get(model).cloned(),
                condensed: false,
                memory_changed: false,
            })
            .collect()
    }

    /// Merge slices returned by a cycle back in.
    ///
    /// Condensed histories are rebased onto entries appended while the cycle
    /// ran. When several aliases of one history were condensed, the first in
    /// pool order wins. Returns whether lessons or working states changed.
    pub fn apply_slices(&mut self, slices: Vec<ModelSlice>) -> bool {
        let mut replaced: BTreeSet<HistoryId> = BTreeSet::new();
        let mut memory_changed = false;

        for slice in slices {
            if !self.pool.contains(&slice.model) {
                continue;
            }
            if slice.condensed
                && let Some(id) = self.histories.history_id(&slice.model)
                && replaced.insert(id)
                && let Some(live) = self.histories.slot(id)
            {
                let rebased = live.rebase(&slice.history);
                self.histories.replace_slot(id, rebased);
            }
            if slice.memory_changed {
                memory_changed = true;
                self.lessons.insert(slice.model.clone(), slice.lessons);
                match slice.working_state {
                    Some(state) => {
                        self.working_states.insert(slice.model, state);
                    }
                    None => {
                        self.working_states.remove(&slice.model);
                    }
                }
            }
        }
        memory_changed
    }

    /// Rebase every history onto `live`, the current version of the history
    /// they were derived from.
    pub fn rebase_onto(&mut self, live: &ModelHistory) {
        for (id, _) in self.histories.slots_with_models() {
            if let Some(history) = self.histories.slot(id) {
                let rebased = live.rebase(history);
                self.histories.replace_slot(id, rebased);
            }
        }
    }
}
