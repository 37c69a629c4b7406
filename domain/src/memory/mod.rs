//! Agentic context memory: lessons and working state per model.

pub mod lesson;
pub mod snapshot;
pub mod working_state;

pub use lesson::{Lesson, LessonKind, cosine_similarity, prune_lessons};
pub use snapshot::{ContextLessons, ContextMemory, WorkingStates};
pub use working_state::WorkingState;
