//! History condensation
//!
//! split → reflect → merge lessons → replace working state → keep remainder.
//! Reflection is best effort: when it fails the history is still condensed
//! and lessons and working state stay as they were.

use super::lesson_manager::LessonManager;
use crate::config::CondensationParams;
use crate::ports::reflection::{ReflectionOptions, Reflector};
use conclave_domain::{
    CostAccumulator, CostContext, Lesson, ModelHistory, ModelId, TokenEstimator, WorkingState,
    split_by_token_fraction,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CondenseError {
    #[error("Condensation made no progress for {model} ({tokens} tokens)")]
    NoProgress { model: ModelId, tokens: usize },
}

/// One model's slice of condensable state
#[derive(Debug, Clone, PartialEq)]
pub struct Condensed {
    pub history: ModelHistory,
    pub lessons: Vec<Lesson>,
    pub working_state: Option<WorkingState>,
    /// Whether reflection succeeded and lessons/working state were updated
    pub reflected: bool,
}

#[derive(Clone)]
pub struct Condenser {
    reflector: Arc<dyn Reflector>,
    lessons: LessonManager,
    estimator: TokenEstimator,
    params: CondensationParams,
}

impl Condenser {
    pub fn new(
        reflector: Arc<dyn Reflector>,
        lessons: LessonManager,
        estimator: TokenEstimator,
        params: CondensationParams,
    ) -> Self {
        Self {
            reflector,
            lessons,
            estimator,
            params,
        }
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Condense `history` once.
    ///
    /// Fails with [`CondenseError::NoProgress`] when the kept remainder is
    /// not strictly smaller in tokens than the input, so callers never loop.
    pub async fn condense(
        &self,
        history: &ModelHistory,
        model: &ModelId,
        lessons: Vec<Lesson>,
        working_state: Option<WorkingState>,
        cost_context: Option<&CostContext>,
        costs: &mut CostAccumulator,
    ) -> Result<Condensed, CondenseError> {
        let before = self.estimator.estimate_history(history);
        let split = split_by_token_fraction(
            history,
            &self.estimator,
            self.params.keep_token_fraction,
            self.params.min_kept_entries,
        );
        let after = self.estimator.estimate_history(&split.kept);
        if split.removed.is_empty() || after >= before {
            return Err(CondenseError::NoProgress {
                model: model.clone(),
                tokens: before,
            });
        }

        info!(
            model = %model,
            removed = split.removed.len(),
            kept = split.kept.len(),
            "Condensing history: {} -> {} tokens",
            before,
            after
        );

        let options = ReflectionOptions {
            cost_context: cost_context.map(|c| c.for_purpose("reflection")),
        };
        let reflection = self.reflector.reflect(&split.removed, model, &options).await;

        let (lessons, working_state, reflected) = match reflection {
            Ok(reflection) => {
                if let Some(cost) = reflection.cost {
                    costs.push(cost);
                }
                let embed_context = cost_context.map(|c| c.for_purpose("lesson_dedup"));
                let merged = self
                    .lessons
                    .accumulate(lessons, reflection.lessons, embed_context.as_ref(), costs)
                    .await;
                let state = match reflection.state.into_iter().next_back() {
                    Some(summary) => Some(WorkingState::new(summary)),
                    None => working_state,
                };
                (merged, state, true)
            }
            Err(e) => {
                warn!(model = %model, "Reflection failed, condensing without lessons: {}", e);
                (lessons, working_state, false)
            }
        };

        Ok(Condensed {
            history: split.kept,
            lessons,
            working_state,
            reflected,
        })
    }
}
