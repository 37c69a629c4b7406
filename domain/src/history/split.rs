//! Splitting a history into an oldest portion to remove and a newest
//! remainder to keep.
//!
//! Histories are stored newest-first. In both split modes the removed
//! portion is returned **oldest-first** (chronological, ready for
//! reflection) while the kept portion stays **newest-first**.

use super::entry::HistoryEntry;
use super::model_history::ModelHistory;
use super::tokens::TokenEstimator;
use std::collections::VecDeque;

/// Result of splitting a history
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySplit {
    /// Oldest entries, chronological order
    pub removed: Vec<HistoryEntry>,
    /// Newest entries, newest-first
    pub kept: ModelHistory,
}

impl HistorySplit {
    fn unchanged(history: &ModelHistory) -> Self {
        Self {
            removed: Vec::new(),
            kept: history.clone(),
        }
    }
}

/// Remove the oldest `n` entries.
///
/// `n == 0` leaves the history unchanged; `n >= len` removes everything.
pub fn split_by_count(history: &ModelHistory, n: usize) -> HistorySplit {
    if n == 0 {
        return HistorySplit::unchanged(history);
    }
    let keep = history.len().saturating_sub(n);
    split_keeping(history, keep)
}

/// Remove entries from the oldest end until the remaining tokens are at most
/// `keep_fraction` of the original total.
///
/// At least `min_keep` of the newest entries are always kept when the
/// history holds that many, so a single oversized entry never collapses
/// the history to nothing.
pub fn split_by_token_fraction(
    history: &ModelHistory,
    estimator: &TokenEstimator,
    keep_fraction: f64,
    min_keep: usize,
) -> HistorySplit {
    let counts: Vec<usize> = history.iter().map(|e| estimator.estimate_entry(e)).collect();
    let total: usize = counts.iter().sum();
    if total == 0 || history.is_empty() {
        return HistorySplit::unchanged(history);
    }

    let budget = (total as f64 * keep_fraction.clamp(0.0, 1.0) + 1e-9).floor() as usize;
    let floor = min_keep.min(history.len());

    // walk newest-first, keeping entries while they fit the budget
    let mut kept_tokens = 0usize;
    let mut keep = 0usize;
    for (i, tokens) in counts.iter().enumerate() {
        if i >= floor && kept_tokens + tokens > budget {
            break;
        }
        kept_tokens += tokens;
        keep += 1;
    }

    split_keeping(history, keep)
}

fn split_keeping(history: &ModelHistory, keep: usize) -> HistorySplit {
    let kept: VecDeque<HistoryEntry> = history.iter().take(keep).cloned().collect();
    let removed: Vec<HistoryEntry> = history.iter().skip(keep).rev().cloned().collect();
    HistorySplit {
        removed,
        kept: history.with_entries(kept),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(texts: &[&str]) -> ModelHistory {
        ModelHistory::from_chronological(texts.iter().map(|t| HistoryEntry::message("u", *t)))
    }

    fn texts<'a>(entries: impl Iterator<Item = &'a HistoryEntry>) -> Vec<String> {
        entries.map(|e| e.text()).collect()
    }

    #[test]
    fn test_split_by_count_removes_oldest() {
        let history = history_of(&["1", "2", "3", "4", "5"]);
        let split = split_by_count(&history, 2);

        assert_eq!(texts(split.removed.iter()), vec!["1", "2"]);
        assert_eq!(texts(split.kept.iter()), vec!["5", "4", "3"]);
    }

    #[test]
    fn test_split_by_count_zero_is_unchanged() {
        let history = history_of(&["1", "2"]);
        let split = split_by_count(&history, 0);
        assert!(split.removed.is_empty());
        assert_eq!(split.kept, history);
    }

    #[test]
    fn test_split_by_count_all() {
        let history = history_of(&["1", "2", "3"]);
        let split = split_by_count(&history, 10);
        assert_eq!(texts(split.removed.iter()), vec!["1", "2", "3"]);
        assert!(split.kept.is_empty());
    }

    #[test]
    fn test_split_by_count_preserves_multiset() {
        let history = history_of(&["a", "b", "c", "d", "e", "f", "g"]);
        for n in 1..history.len() {
            let split = split_by_count(&history, n);
            assert_eq!(split.removed.len(), n);
            assert_eq!(split.kept.len(), history.len() - n);

            let mut rejoined: Vec<HistoryEntry> = split.removed.clone();
            rejoined.extend(split.kept.chronological().cloned());
            let original: Vec<HistoryEntry> = history.chronological().cloned().collect();
            assert_eq!(rejoined, original);
        }
    }

    #[test]
    fn test_split_by_token_fraction_keeps_about_a_fifth() {
        let est = TokenEstimator::shared().unwrap();
        let line = "the quick brown fox jumps over the lazy dog again and again";
        let entries: Vec<&str> = std::iter::repeat(line).take(20).collect();
        let history = history_of(&entries);

        let split = split_by_token_fraction(&history, &est, 0.2, 2);
        let total = est.estimate_history(&history);
        let kept = est.estimate_history(&split.kept);

        assert!(kept <= total / 5);
        assert_eq!(split.kept.len(), 4);
        assert_eq!(split.removed.len(), 16);
    }

    #[test]
    fn test_split_by_token_fraction_min_keep() {
        let est = TokenEstimator::shared().unwrap();
        let big = "word ".repeat(500);
        let history = history_of(&["small", &big, &big]);

        let split = split_by_token_fraction(&history, &est, 0.2, 2);
        assert_eq!(split.kept.len(), 2);
        assert_eq!(split.removed.len(), 1);
        assert_eq!(split.removed[0].text(), "small");
    }

    #[test]
    fn test_split_by_token_fraction_empty() {
        let est = TokenEstimator::shared().unwrap();
        let split = split_by_token_fraction(&ModelHistory::new(), &est, 0.2, 2);
        assert!(split.removed.is_empty());
        assert!(split.kept.is_empty());
    }
}
