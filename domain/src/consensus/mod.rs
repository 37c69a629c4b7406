//! Multi-model consensus on the next action
//!
//! Every model in the pool proposes one action. Proposals are grouped into
//! [`Cluster`]s of equivalent actions ([`MatchRules`]), and a cluster wins by
//! quorum or strict plurality ([`decide`]). Without a winner the models see
//! a refinement prompt and try again at a lower temperature; after the last
//! round the largest cluster is taken as a forced decision.

pub mod cluster;
pub mod decision;
pub mod matching;
pub mod proposal;
pub mod refinement;
pub mod rule;
pub mod temperature;

pub use cluster::{Cluster, cluster_proposals};
pub use decision::{Decision, DecisionKind, DecisionPolicy, Verdict, decide, force_pick};
pub use matching::{FieldRule, MatchRules, SimilarityFn};
pub use proposal::{ModelProposal, Proposal, extract_json_object, parse_proposal};
pub use refinement::build_refinement_prompt;
pub use rule::QuorumRule;
pub use temperature::TemperatureSchedule;
