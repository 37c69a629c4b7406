//! Token estimation with a BPE tokenizer
//!
//! Context-limit enforcement relies on counts that track real provider
//! tokenizers. Word counting underestimates path-like and punctuation-dense
//! text by an order of magnitude, so estimates here always go through the
//! `cl100k_base` byte-pair encoding.

use super::entry::HistoryEntry;
use super::model_history::ModelHistory;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tiktoken_rs::CoreBPE;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TokenError {
    #[error("Tokenizer could not be initialized: {0}")]
    Init(String),

    #[error("Input is not valid UTF-8: {0}")]
    InvalidUtf8(String),
}

/// Estimates token counts for text and histories.
#[derive(Clone)]
pub struct TokenEstimator {
    bpe: Arc<CoreBPE>,
}

static SHARED: OnceLock<Result<TokenEstimator, TokenError>> = OnceLock::new();

impl TokenEstimator {
    pub fn new() -> Result<Self, TokenError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| TokenError::Init(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }

    /// Process-wide estimator, loaded on first use.
    pub fn shared() -> Result<Self, TokenError> {
        SHARED.get_or_init(Self::new).clone()
    }

    /// Token count of `text`; `None` and empty text count as zero.
    pub fn estimate(&self, text: Option<&str>) -> usize {
        match text {
            None | Some("") => 0,
            Some(text) => self.bpe.encode_with_special_tokens(text).len(),
        }
    }

    pub fn estimate_str(&self, text: &str) -> usize {
        self.estimate(Some(text))
    }

    /// Token count of raw bytes. Bytes that are not UTF-8 are rejected.
    pub fn estimate_bytes(&self, bytes: &[u8]) -> Result<usize, TokenError> {
        let text = std::str::from_utf8(bytes).map_err(|e| TokenError::InvalidUtf8(e.to_string()))?;
        Ok(self.estimate_str(text))
    }

    pub fn estimate_entry(&self, entry: &HistoryEntry) -> usize {
        self.estimate_str(&entry.display_text())
    }

    pub fn estimate_entries<'a>(&self, entries: impl IntoIterator<Item = &'a HistoryEntry>) -> usize {
        entries.into_iter().map(|e| self.estimate_entry(e)).sum()
    }

    pub fn estimate_history(&self, history: &ModelHistory) -> usize {
        self.estimate_entries(history.iter())
    }
}

impl std::fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEstimator").field("encoding", &"cl100k_base").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> TokenEstimator {
        TokenEstimator::shared().unwrap()
    }

    #[test]
    fn test_empty_and_none() {
        let est = estimator();
        assert_eq!(est.estimate(None), 0);
        assert_eq!(est.estimate(Some("")), 0);
    }

    #[test]
    fn test_paths_count_more_than_words() {
        let est = estimator();
        let path = "/usr/local/lib/python3.11/site-packages/requests/adapters.py";
        let words = path.split_whitespace().count();
        assert_eq!(words, 1);
        assert!(est.estimate_str(path) > 5 * words);
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let est = estimator();
        let result = est.estimate_bytes(&[0xff, 0xfe, 0x00]);
        assert!(matches!(result, Err(TokenError::InvalidUtf8(_))));
        assert_eq!(est.estimate_bytes(b"hello").unwrap(), est.estimate_str("hello"));
    }

    #[test]
    fn test_history_counts_decision_display_form() {
        let est = estimator();
        let decision = HistoryEntry::decision("orient", &serde_json::json!({}), "look around");
        let mut history = ModelHistory::new();
        history.push(decision.clone());
        history.push(HistoryEntry::message("user", "hello there"));

        let expected = est.estimate_str(&decision.display_text()) + est.estimate_str("hello there");
        assert_eq!(est.estimate_history(&history), expected);
    }
}
