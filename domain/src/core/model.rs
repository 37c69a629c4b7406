//! Model identifier value object

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

/// Identifier of an LLM model participating in an agent's pool (Value Object)
///
/// Model ids are opaque provider strings such as `"claude-sonnet-4.5"` or
/// `"gpt-5.2"`. The runtime keys per-model state (history, lessons, working
/// state) by this id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelId(String);

impl ModelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Provider family inferred from the id.
    pub fn family(&self) -> ModelFamily {
        ModelFamily::detect(&self.0)
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ModelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ModelId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Provider family of a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Claude,
    Gpt,
    Gemini,
    Other,
}

impl ModelFamily {
    /// Detect the family from a model id.
    ///
    /// Matching is substring based so provider-prefixed ids such as
    /// `"anthropic/claude-3-haiku"` resolve correctly.
    pub fn detect(id: &str) -> Self {
        let id = id.to_lowercase();
        if id.contains("claude") {
            ModelFamily::Claude
        } else if id.contains("gpt") || id.starts_with("o1") || id.starts_with("o3") {
            ModelFamily::Gpt
        } else if id.contains("gemini") {
            ModelFamily::Gemini
        } else {
            ModelFamily::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Claude => "claude",
            ModelFamily::Gpt => "gpt",
            ModelFamily::Gemini => "gemini",
            ModelFamily::Other => "other",
        }
    }
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
