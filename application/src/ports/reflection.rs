//! Reflection port
//!
//! Distills the removed portion of a condensed history into lessons and a
//! working-state summary.

use async_trait::async_trait;
use conclave_domain::{CostContext, CostRecord, HistoryEntry, Lesson, ModelId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReflectionError {
    #[error("Reflection failed: {0}")]
    Failed(String),

    #[error("Unparseable reflection output: {0}")]
    InvalidOutput(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReflectionOptions {
    pub cost_context: Option<CostContext>,
}

/// What a reflection pass extracted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reflection {
    pub lessons: Vec<Lesson>,
    /// Working-state summaries; the last one replaces the model's state
    pub state: Vec<String>,
    pub cost: Option<CostRecord>,
}

#[async_trait]
pub trait Reflector: Send + Sync {
    /// Reflect on `entries` (chronological) on behalf of `model`.
    async fn reflect(
        &self,
        entries: &[HistoryEntry],
        model: &ModelId,
        options: &ReflectionOptions,
    ) -> Result<Reflection, ReflectionError>;
}

/// Reflector that extracts nothing.
pub struct NoReflection;

#[async_trait]
impl Reflector for NoReflection {
    async fn reflect(
        &self,
        _entries: &[HistoryEntry],
        _model: &ModelId,
        _options: &ReflectionOptions,
    ) -> Result<Reflection, ReflectionError> {
        Ok(Reflection::default())
    }
}
