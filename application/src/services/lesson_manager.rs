//! Lesson accumulation with embedding-based deduplication

use crate::config::LessonParams;
use crate::ports::embedding::Embedder;
use conclave_domain::{CostAccumulator, CostContext, Lesson, cosine_similarity, prune_lessons};
use std::sync::Arc;
use tracing::{debug, warn};

/// Folds newly extracted lessons into a model's existing lessons.
#[derive(Clone)]
pub struct LessonManager {
    embedder: Arc<dyn Embedder>,
    params: LessonParams,
}

impl LessonManager {
    pub fn new(embedder: Arc<dyn Embedder>, params: LessonParams) -> Self {
        Self { embedder, params }
    }

    /// Merge `new` into `existing`.
    ///
    /// New lessons are folded in one at a time, so a later lesson can also
    /// merge with an earlier one from the same batch. A lesson whose best
    /// match reaches the similarity threshold reinforces that match;
    /// anything else is appended. The result is pruned to `max_lessons`.
    ///
    /// Embedding failures never lose information: an existing lesson that
    /// cannot be embedded is just left out of the comparison, and a new one
    /// that cannot be embedded is added without deduplication.
    pub async fn accumulate(
        &self,
        existing: Vec<Lesson>,
        new: Vec<Lesson>,
        cost_context: Option<&CostContext>,
        costs: &mut CostAccumulator,
    ) -> Vec<Lesson> {
        if new.is_empty() {
            return existing;
        }

        let mut lessons: Vec<(Lesson, Option<Vec<f32>>)> = Vec::with_capacity(existing.len() + new.len());
        for lesson in existing {
            let vector = self.embed(&lesson.content, cost_context, costs).await;
            lessons.push((lesson, vector));
        }

        for lesson in new {
            let Some(vector) = self.embed(&lesson.content, cost_context, costs).await else {
                lessons.push((lesson, None));
                continue;
            };

            let best = lessons
                .iter()
                .enumerate()
                .filter_map(|(i, (_, v))| v.as_ref().map(|v| (i, cosine_similarity(v, &vector))))
                .fold(None, |best: Option<(usize, f32)>, (i, score)| match best {
                    Some((_, top)) if top >= score => best,
                    _ => Some((i, score)),
                });

            match best {
                Some((i, score)) if score >= self.params.similarity_threshold => {
                    debug!("Merging lesson (similarity {:.3}): {}", score, lesson.content);
                    let (matched, matched_vector) = &mut lessons[i];
                    matched.reinforce(&lesson);
                    *matched_vector = Some(vector);
                }
                _ => lessons.push((lesson, Some(vector))),
            }
        }

        prune_lessons(
            lessons.into_iter().map(|(lesson, _)| lesson).collect(),
            self.params.max_lessons,
        )
    }

    async fn embed(
        &self,
        text: &str,
        cost_context: Option<&CostContext>,
        costs: &mut CostAccumulator,
    ) -> Option<Vec<f32>> {
        match self.embedder.embed(text, cost_context).await {
            Ok(embedding) => {
                if let Some(cost) = embedding.cost {
                    costs.push(cost);
                }
                Some(embedding.vector)
            }
            Err(e) => {
                warn!("Lesson embedding failed: {}", e);
                None
            }
        }
    }
}
