//! Per-model conversation history

use super::entry::HistoryEntry;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Ordered history for one model, stored **newest-first**.
///
/// New entries are prepended. `appended` counts every entry ever pushed
/// (it is not decremented by condensation), which lets a condensed copy
/// taken at some earlier point be rebased onto entries appended since.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelHistory {
    entries: VecDeque<HistoryEntry>,
    #[serde(default)]
    appended: u64,
}

impl ModelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a history from entries given newest-first.
    pub fn from_newest_first(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let entries: VecDeque<_> = entries.into_iter().collect();
        let appended = entries.len() as u64;
        Self { entries, appended }
    }

    /// Build a history from entries given oldest-first.
    pub fn from_chronological(entries: impl IntoIterator<Item = HistoryEntry>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            history.push(entry);
        }
        history
    }

    /// Prepend a new entry.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.appended += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn newest(&self) -> Option<&HistoryEntry> {
        self.entries.front()
    }

    /// Entries newest-first (storage order).
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    /// Entries oldest-first.
    pub fn chronological(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev()
    }

    /// Replace the retained entries, keeping the append counter.
    pub(crate) fn with_entries(&self, entries: VecDeque<HistoryEntry>) -> Self {
        Self {
            entries,
            appended: self.appended,
        }
    }

    /// Rebase a condensed copy onto this (live) history.
    ///
    /// `condensed` must have been derived from a snapshot of this history whose
    /// append counter was `condensed.appended()`. Entries pushed to `self` since
    /// then are kept on top of the condensed remainder.
    pub fn rebase(&self, condensed: &ModelHistory) -> ModelHistory {
        let since = self.appended.saturating_sub(condensed.appended) as usize;
        let since = since.min(self.entries.len());
        let mut entries: VecDeque<HistoryEntry> =
            self.entries.iter().take(since).cloned().collect();
        entries.extend(condensed.entries.iter().cloned());
        Self {
            entries,
            appended: self.appended,
        }
    }
}
