//! Domain layer for conclave
//!
//! Pure types and algorithms of the agent decision cycle. Nothing here does
//! I/O or owns a task; the application layer drives these types from each
//! agent's actor loop.
//!
//! # Core Concepts
//!
//! ## Histories
//!
//! Every model in an agent's pool keeps its own newest-first
//! [`ModelHistory`]. Histories are condensed by splitting off the oldest
//! portion ([`split_by_token_fraction`]) and distilling it into
//! [`Lesson`]s and a [`WorkingState`].
//!
//! ## Consensus
//!
//! Each model proposes one action per round. Equivalent proposals form
//! clusters; a cluster wins by quorum or strict plurality, otherwise the
//! models refine at a lower temperature until the last round forces a pick.

pub mod action;
pub mod agent;
pub mod consensus;
pub mod core;
pub mod cost;
pub mod history;
pub mod memory;
pub mod prompt;
pub mod util;

pub use action::{
    ActionCatalog, ActionId, ActionTraits, ExecutionMode, NormalizedWait, PendingAction,
    PendingActions, WaitPolicy, normalize_wait,
};
pub use agent::{AgentId, BudgetMode, BudgetState, CapabilityGroup, TaskId};
pub use consensus::{
    Cluster, Decision, DecisionKind, DecisionPolicy, FieldRule, MatchRules, ModelProposal,
    Proposal, QuorumRule, TemperatureSchedule, Verdict, build_refinement_prompt,
    cluster_proposals, decide, force_pick, parse_proposal,
};
pub use core::{
    error::DomainError,
    model::{ModelFamily, ModelId},
};
pub use cost::{CostAccumulator, CostContext, CostKind, CostRecord};
pub use history::{
    EntryKind, HistoryEntry, HistoryId, HistorySplit, HistoryStore, ModelHistory, TokenError,
    TokenEstimator, split_by_count, split_by_token_fraction,
};
pub use memory::{
    ContextLessons, ContextMemory, Lesson, LessonKind, WorkingState, WorkingStates,
    cosine_similarity, prune_lessons,
};
pub use prompt::{ContextBlocks, Message, Role, TodoItem};
