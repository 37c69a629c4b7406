//! Model-id → history mapping with explicit aliasing
//!
//! Several pool members may point at the *same* history (for example after a
//! pool switch, where every new member continues from one donor history).
//! Aliasing is expressed with an indirection table rather than shared
//! pointers: each model id maps to a [`HistoryId`] slot, and a mutation made
//! through any alias is visible through all of them.

use super::entry::HistoryEntry;
use super::model_history::ModelHistory;
use crate::core::model::ModelId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a history slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryId(u64);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryStore {
    slots: BTreeMap<HistoryId, ModelHistory>,
    index: BTreeMap<ModelId, HistoryId>,
    next_id: u64,
}

impl HistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store where every model gets its own private copy of `history`.
    pub fn with_private(models: &[ModelId], history: &ModelHistory) -> Self {
        let mut store = Self::new();
        for model in models {
            store.insert(model.clone(), history.clone());
        }
        store
    }

    /// A store where every model aliases one shared history.
    pub fn with_shared(models: &[ModelId], history: ModelHistory) -> Self {
        let mut store = Self::new();
        if models.is_empty() {
            return store;
        }
        let id = store.allocate(history);
        for model in models {
            store.index.insert(model.clone(), id);
        }
        store
    }

    fn allocate(&mut self, history: ModelHistory) -> HistoryId {
        let id = HistoryId(self.next_id);
        self.next_id += 1;
        self.slots.insert(id, history);
        id
    }

    /// Give `model` its own history, replacing any previous mapping.
    pub fn insert(&mut self, model: ModelId, history: ModelHistory) -> HistoryId {
        let id = self.allocate(history);
        self.index.insert(model, id);
        self.collect_garbage();
        id
    }

    pub fn get(&self, model: &ModelId) -> Option<&ModelHistory> {
        self.index.get(model).and_then(|id| self.slots.get(id))
    }

    pub fn get_mut(&mut self, model: &ModelId) -> Option<&mut ModelHistory> {
        let id = self.index.get(model)?;
        self.slots.get_mut(id)
    }

    pub fn slot(&self, id: HistoryId) -> Option<&ModelHistory> {
        self.slots.get(&id)
    }

    /// Replace the contents of a slot (visible through every alias).
    pub fn replace_slot(&mut self, id: HistoryId, history: ModelHistory) -> bool {
        match self.slots.get_mut(&id) {
            Some(slot) => {
                *slot = history;
                true
            }
            None => false,
        }
    }

    pub fn history_id(&self, model: &ModelId) -> Option<HistoryId> {
        self.index.get(model).copied()
    }

    pub fn contains(&self, model: &ModelId) -> bool {
        self.index.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelId> {
        self.index.keys()
    }

    /// Distinct slots together with every model aliasing them.
    pub fn slots_with_models(&self) -> Vec<(HistoryId, Vec<ModelId>)> {
        let mut grouped: BTreeMap<HistoryId, Vec<ModelId>> = BTreeMap::new();
        for (model, id) in &self.index {
            grouped.entry(*id).or_default().push(model.clone());
        }
        grouped.into_iter().collect()
    }

    /// Prepend an entry once to every distinct history.
    pub fn push_all(&mut self, entry: HistoryEntry) {
        let live: BTreeSet<HistoryId> = self.index.values().copied().collect();
        for id in live {
            if let Some(history) = self.slots.get_mut(&id) {
                history.push(entry.clone());
            }
        }
    }

    /// Ensure every model in `pool` has a history, creating empty ones as needed.
    pub fn ensure(&mut self, pool: &[ModelId]) {
        for model in pool {
            if !self.index.contains_key(model) {
                self.insert(model.clone(), ModelHistory::new());
            }
        }
    }

    /// Models that share one slot, one group per shared slot. Private
    /// histories are left out.
    pub fn alias_groups(&self) -> Vec<Vec<ModelId>> {
        self.slots_with_models()
            .into_iter()
            .map(|(_, models)| models)
            .filter(|models| models.len() > 1)
            .collect()
    }

    /// Point every model in `models` at the first one's slot. Models without
    /// a history are skipped.
    pub fn share(&mut self, models: &[ModelId]) {
        let mut present = models.iter().filter(|m| self.index.contains_key(*m));
        let Some(id) = present.next().and_then(|m| self.history_id(m)) else {
            return;
        };
        let rest: Vec<ModelId> = present.cloned().collect();
        for model in rest {
            self.index.insert(model, id);
        }
        self.collect_garbage();
    }

    /// Snapshot of the histories keyed by model (aliases become copies).
    /// [`alias_groups`](Self::alias_groups) records which copies were shared.
    pub fn to_map(&self) -> BTreeMap<ModelId, ModelHistory> {
        self.index
            .iter()
            .filter_map(|(model, id)| self.slots.get(id).map(|h| (model.clone(), h.clone())))
            .collect()
    }

    fn collect_garbage(&mut self) {
        let live: BTreeSet<HistoryId> = self.index.values().copied().collect();
        self.slots.retain(|id, _| live.contains(id));
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}
