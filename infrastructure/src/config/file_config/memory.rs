//! Memory settings (`[condensation]`, `[lessons]`, `[context]`)
//!
//! ```toml
//! [condensation]
//! keep_token_fraction = 0.2
//! min_kept_entries = 2
//!
//! [lessons]
//! similarity_threshold = 0.9
//! max_lessons = 100
//!
//! [context]
//! default_limit = 128000
//!
//! [context.limits]
//! "small-model" = 8000
//! ```

use crate::config::validation::ConfigIssue;
use conclave_application::config::{CondensationParams, ContextLimits, LessonParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCondensationConfig {
    /// Share of the history's tokens kept after condensing
    pub keep_token_fraction: f64,
    pub min_kept_entries: usize,
}

impl Default for FileCondensationConfig {
    fn default() -> Self {
        let params = CondensationParams::default();
        Self {
            keep_token_fraction: params.keep_token_fraction,
            min_kept_entries: params.min_kept_entries,
        }
    }
}

impl FileCondensationConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if !(self.keep_token_fraction > 0.0 && self.keep_token_fraction < 1.0) {
            issues.push(ConfigIssue::out_of_range(
                "condensation.keep_token_fraction",
                self.keep_token_fraction,
                "a value in (0, 1)",
            ));
        }
        issues
    }

    pub fn to_params(&self) -> CondensationParams {
        CondensationParams {
            keep_token_fraction: self.keep_token_fraction,
            min_kept_entries: self.min_kept_entries,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLessonsConfig {
    /// Lessons at least this similar are merged
    pub similarity_threshold: f32,
    pub max_lessons: usize,
}

impl Default for FileLessonsConfig {
    fn default() -> Self {
        let params = LessonParams::default();
        Self {
            similarity_threshold: params.similarity_threshold,
            max_lessons: params.max_lessons,
        }
    }
}

impl FileLessonsConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            issues.push(ConfigIssue::out_of_range(
                "lessons.similarity_threshold",
                self.similarity_threshold,
                "a value in (0, 1]",
            ));
        }
        if self.max_lessons == 0 {
            issues.push(ConfigIssue::out_of_range("lessons.max_lessons", 0, "at least 1"));
        }
        issues
    }

    pub fn to_params(&self) -> LessonParams {
        LessonParams {
            similarity_threshold: self.similarity_threshold,
            max_lessons: self.max_lessons,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileContextConfig {
    /// Context window in tokens for models without an entry in `limits`
    pub default_limit: usize,
    pub limits: BTreeMap<String, usize>,
}

impl Default for FileContextConfig {
    fn default() -> Self {
        let limits = ContextLimits::default();
        Self {
            default_limit: limits.default,
            limits: limits.per_model,
        }
    }
}

impl FileContextConfig {
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.default_limit == 0 {
            issues.push(ConfigIssue::out_of_range("context.default_limit", 0, "at least 1"));
        }
        for (model, limit) in &self.limits {
            if *limit == 0 {
                issues.push(ConfigIssue::out_of_range(
                    &format!("context.limits.{}", model),
                    0,
                    "at least 1",
                ));
            }
        }
        issues
    }

    pub fn to_limits(&self) -> ContextLimits {
        ContextLimits {
            default: self.default_limit,
            per_model: self.limits.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(FileCondensationConfig::default().validate().is_empty());
        assert!(FileLessonsConfig::default().validate().is_empty());
        assert!(FileContextConfig::default().validate().is_empty());
        assert_eq!(FileContextConfig::default().to_limits(), ContextLimits::default());
    }

    #[test]
    fn test_out_of_range_values() {
        let condensation = FileCondensationConfig {
            keep_token_fraction: 1.0,
            ..Default::default()
        };
        assert_eq!(condensation.validate().len(), 1);

        let lessons = FileLessonsConfig {
            similarity_threshold: 0.0,
            max_lessons: 0,
        };
        assert_eq!(lessons.validate().len(), 2);

        let mut context = FileContextConfig::default();
        context.limits.insert("tiny".to_string(), 0);
        let issues = context.validate();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("context.limits.tiny"));
    }
}
