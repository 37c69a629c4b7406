//! Lessons distilled from condensed history

use serde::{Deserialize, Serialize};

/// Category of a lesson
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LessonKind {
    #[default]
    Factual,
    Behavioral,
    Strategic,
    #[serde(other)]
    Other,
}

impl LessonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LessonKind::Factual => "factual",
            LessonKind::Behavioral => "behavioral",
            LessonKind::Strategic => "strategic",
            LessonKind::Other => "other",
        }
    }
}

/// A short, confidence-weighted note a model should carry forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(rename = "type", default)]
    pub kind: LessonKind,
    pub content: String,
    #[serde(default = "default_confidence")]
    pub confidence: u32,
}

fn default_confidence() -> u32 {
    1
}

impl Lesson {
    pub fn new(kind: LessonKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            confidence: 1,
        }
    }

    pub fn factual(content: impl Into<String>) -> Self {
        Self::new(LessonKind::Factual, content)
    }

    pub fn behavioral(content: impl Into<String>) -> Self {
        Self::new(LessonKind::Behavioral, content)
    }

    pub fn with_confidence(mut self, confidence: u32) -> Self {
        self.confidence = confidence.max(1);
        self
    }

    /// Fold a newer phrasing of the same lesson into this one.
    ///
    /// Confidence grows by exactly one, the newest wording wins and the
    /// original kind is preserved.
    pub fn reinforce(&mut self, newer: &Lesson) {
        self.confidence += 1;
        self.content = newer.content.clone();
    }
}

/// Keep the `max` highest-confidence lessons.
///
/// Ties are broken by original position, and survivors keep their original
/// relative order.
pub fn prune_lessons(lessons: Vec<Lesson>, max: usize) -> Vec<Lesson> {
    if lessons.len() <= max {
        return lessons;
    }
    let mut ranked: Vec<(usize, u32)> = lessons
        .iter()
        .enumerate()
        .map(|(i, l)| (i, l.confidence))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mut survivors: Vec<usize> = ranked.into_iter().take(max).map(|(i, _)| i).collect();
    survivors.sort_unstable();

    let mut slots: Vec<Option<Lesson>> = lessons.into_iter().map(Some).collect();
    survivors
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Cosine similarity of two vectors; zero for empty or mismatched input.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
