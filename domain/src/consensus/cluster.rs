//! Grouping equivalent proposals

use super::matching::{MatchRules, SimilarityFn};
use super::proposal::{ModelProposal, Proposal};
use crate::core::model::ModelId;

/// Proposals judged equivalent, in the order they were seen.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    members: Vec<ModelProposal>,
}

impl Cluster {
    fn new(first: ModelProposal) -> Self {
        Self {
            members: vec![first],
        }
    }

    /// The first proposal that opened the cluster.
    pub fn representative(&self) -> &Proposal {
        &self.members[0].proposal
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn members(&self) -> &[ModelProposal] {
        &self.members
    }

    pub fn models(&self) -> Vec<ModelId> {
        self.members.iter().map(|m| m.model.clone()).collect()
    }
}

/// Cluster proposals greedily: each proposal joins the first cluster whose
/// representative it is equivalent to, otherwise it opens a new cluster.
///
/// Cluster order is first-seen order, which later breaks ties.
pub fn cluster_proposals(
    proposals: &[ModelProposal],
    rules: &MatchRules,
    similarity: &SimilarityFn<'_>,
) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for proposal in proposals {
        let home = clusters
            .iter_mut()
            .find(|c| rules.equivalent(c.representative(), &proposal.proposal, similarity));
        match home {
            Some(cluster) => cluster.members.push(proposal.clone()),
            None => clusters.push(Cluster::new(proposal.clone())),
        }
    }
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mp(model: &str, action: &str) -> ModelProposal {
        ModelProposal::new(ModelId::from(model), Proposal::new(action, json!({})))
    }

    #[test]
    fn test_clusters_in_first_seen_order() {
        let proposals = vec![
            mp("m1", "orient"),
            mp("m2", "wait"),
            mp("m3", "orient"),
            mp("m4", "orient"),
        ];
        let clusters = cluster_proposals(&proposals, &MatchRules::default(), &|_, _| None);

        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].representative().action, "orient");
        assert_eq!(clusters[0].size(), 3);
        assert_eq!(
            clusters[0].models(),
            vec![ModelId::from("m1"), ModelId::from("m3"), ModelId::from("m4")]
        );
        assert_eq!(clusters[1].representative().action, "wait");
    }

    #[test]
    fn test_empty_input() {
        let clusters = cluster_proposals(&[], &MatchRules::default(), &|_, _| None);
        assert!(clusters.is_empty());
    }
}
