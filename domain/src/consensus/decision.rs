//! Picking a winning cluster

use super::cluster::Cluster;
use super::proposal::Proposal;
use super::rule::QuorumRule;
use crate::core::model::ModelId;
use serde::{Deserialize, Serialize};

/// Parameters of the per-round decision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub rule: QuorumRule,
    /// Responses needed before a plurality may decide
    pub min_responses: usize,
    pub plurality_fallback: bool,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            rule: QuorumRule::Majority,
            min_responses: 2,
            plurality_fallback: true,
        }
    }
}

/// Outcome of one round, indexes refer to the cluster list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Quorum(usize),
    Plurality(usize),
    NoConsensus,
}

impl Verdict {
    pub fn winner(&self) -> Option<usize> {
        match self {
            Verdict::Quorum(i) | Verdict::Plurality(i) => Some(*i),
            Verdict::NoConsensus => None,
        }
    }
}

/// Decide one round.
///
/// A cluster satisfying the quorum rule wins outright. Otherwise, with
/// plurality enabled and at least `min_responses` responses, a cluster that
/// is strictly larger than every other cluster wins.
pub fn decide(clusters: &[Cluster], responded: usize, policy: &DecisionPolicy) -> Verdict {
    let Some(largest) = largest_cluster(clusters) else {
        return Verdict::NoConsensus;
    };
    let size = clusters[largest].size();

    if policy.rule.is_satisfied(size, responded) {
        return Verdict::Quorum(largest);
    }

    if policy.plurality_fallback && responded >= policy.min_responses {
        let strict = clusters
            .iter()
            .enumerate()
            .all(|(i, c)| i == largest || c.size() < size);
        if strict {
            return Verdict::Plurality(largest);
        }
    }
    Verdict::NoConsensus
}

/// Largest cluster regardless of quorum; ties go to the first seen.
pub fn force_pick(clusters: &[Cluster]) -> Option<usize> {
    largest_cluster(clusters)
}

fn largest_cluster(clusters: &[Cluster]) -> Option<usize> {
    clusters
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, usize)>, (i, c)| match best {
            Some((_, size)) if size >= c.size() => best,
            _ => Some((i, c.size())),
        })
        .map(|(i, _)| i)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    Consensus,
    ForcedDecision,
}

/// The action chosen by a consensus cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub kind: DecisionKind,
    pub proposal: Proposal,
    pub supporters: Vec<ModelId>,
    pub round: u32,
}
