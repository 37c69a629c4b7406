//! Consensus aggregation over the model pool
//!
//! One consensus cycle runs up to `max_rounds` rounds:
//!
//! 1. every model is queried with its own history (in parallel)
//! 2. responses are parsed into proposals; unparseable ones count as failed
//! 3. proposals are clustered, embedding the similarity-matched fields once
//!    per round
//! 4. a cluster wins by quorum or plurality; otherwise the next round sees a
//!    refinement prompt, and after the last round the largest cluster is
//!    taken as a forced decision
//!
//! Costs from queries, condensation and clustering embeddings are gathered
//! into one [`CostAccumulator`] that the caller flushes after the cycle.

use super::query_engine::{ModelSlice, PerModelQueryEngine, QueryError, QueryRequest};
use crate::config::ConsensusParams;
use crate::ports::embedding::Embedder;
use conclave_domain::{
    Cluster, ContextBlocks, CostAccumulator, CostContext, Decision, DecisionKind, ModelProposal,
    build_refinement_prompt, cluster_proposals, cosine_similarity, decide, force_pick,
    parse_proposal,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsensusError {
    #[error("All models failed to respond in round {round}")]
    AllModelsFailed { round: u32 },

    #[error("No models in the pool")]
    NoModels,
}

/// Input of one consensus cycle
#[derive(Debug, Clone, Default)]
pub struct ConsensusInput {
    /// One slice per pool member, in pool order
    pub slices: Vec<ModelSlice>,
    pub blocks: ContextBlocks,
    pub cost_context: Option<CostContext>,
    pub force_condense: bool,
}

/// Result of one consensus cycle.
///
/// The slices are returned even when the cycle fails, since condensation
/// may already have replaced histories, lessons and working states.
#[derive(Debug)]
pub struct ConsensusOutcome {
    pub result: Result<Decision, ConsensusError>,
    pub slices: Vec<ModelSlice>,
    pub costs: CostAccumulator,
    pub rounds: u32,
}

#[derive(Clone)]
pub struct ConsensusAggregator {
    engine: PerModelQueryEngine,
    embedder: Arc<dyn Embedder>,
    params: ConsensusParams,
}

impl ConsensusAggregator {
    pub fn new(engine: PerModelQueryEngine, embedder: Arc<dyn Embedder>, params: ConsensusParams) -> Self {
        Self {
            engine,
            embedder,
            params,
        }
    }

    pub fn engine(&self) -> &PerModelQueryEngine {
        &self.engine
    }

    /// Run one consensus cycle.
    pub async fn run(&self, input: ConsensusInput) -> ConsensusOutcome {
        let ConsensusInput {
            mut slices,
            blocks,
            cost_context,
            force_condense,
        } = input;
        let mut costs = CostAccumulator::new();

        if slices.is_empty() {
            return ConsensusOutcome {
                result: Err(ConsensusError::NoModels),
                slices,
                costs,
                rounds: 0,
            };
        }

        let max_rounds = self.params.max_rounds.max(1);
        let mut refinement: Option<String> = None;
        let mut round = 1;

        let result = loop {
            let request = QueryRequest {
                round,
                refinement: refinement.take(),
                force_condense: force_condense && round == 1,
                blocks: blocks.clone(),
                cost_context: cost_context.clone(),
            };

            let proposals = self.query_round(&mut slices, &request, &mut costs).await;
            if proposals.is_empty() {
                warn!(round, "All models failed to respond");
                break Err(ConsensusError::AllModelsFailed { round });
            }

            let clusters = self
                .cluster(&proposals, cost_context.as_ref(), &mut costs)
                .await;
            let verdict = decide(&clusters, proposals.len(), &self.params.policy);
            debug!(
                round,
                responded = proposals.len(),
                clusters = clusters.len(),
                "Round verdict: {:?}",
                verdict
            );

            if let Some(winner) = verdict.winner() {
                info!(round, "Consensus on '{}'", clusters[winner].representative().action);
                break Ok(decision(DecisionKind::Consensus, &clusters[winner], round));
            }

            if round >= max_rounds {
                // force_pick only returns None for an empty cluster list,
                // which cannot happen with at least one proposal
                match force_pick(&clusters) {
                    Some(pick) => {
                        info!(round, "No consensus, forcing '{}'", clusters[pick].representative().action);
                        break Ok(decision(DecisionKind::ForcedDecision, &clusters[pick], round));
                    }
                    None => break Err(ConsensusError::AllModelsFailed { round }),
                }
            }

            refinement = Some(build_refinement_prompt(&clusters, round + 1, max_rounds));
            round += 1;
        };

        ConsensusOutcome {
            result,
            slices,
            costs,
            rounds: round,
        }
    }

    /// Query every slice concurrently and parse the answers.
    async fn query_round(
        &self,
        slices: &mut [ModelSlice],
        request: &QueryRequest,
        costs: &mut CostAccumulator,
    ) -> Vec<ModelProposal> {
        let queries = slices.iter_mut().map(|slice| async move {
            let mut local = CostAccumulator::new();
            let response = self.engine.query(slice, request, &mut local).await;
            (slice.model.clone(), response, local)
        });

        let mut proposals = Vec::new();
        for (model, response, local) in join_all(queries).await {
            costs.extend(local);
            match response {
                Ok(response) => match parse_proposal(&model, &response.content) {
                    Ok(proposal) => proposals.push(ModelProposal::new(model, proposal)),
                    Err(e) => warn!(model = %model, round = request.round, "{}", e),
                },
                Err(QueryError::ContextLengthExceeded(_)) => {
                    warn!(model = %model, round = request.round, "Context still too long after condensing");
                }
                Err(e) => warn!(model = %model, round = request.round, "Query failed: {}", e),
            }
        }
        proposals
    }

    /// Cluster proposals, embedding the similarity-matched texts up front.
    ///
    /// A text that fails to embed has no vector, so comparisons involving it
    /// fall back to exact equality.
    async fn cluster(
        &self,
        proposals: &[ModelProposal],
        cost_context: Option<&CostContext>,
        costs: &mut CostAccumulator,
    ) -> Vec<Cluster> {
        let rules = &self.params.match_rules;
        let texts = rules.similarity_texts(proposals.iter().map(|p| &p.proposal));
        let embed_context = cost_context.map(|c| c.for_purpose("clustering"));

        let mut vectors: BTreeMap<String, Vec<f32>> = BTreeMap::new();
        for text in texts {
            match self.embedder.embed(&text, embed_context.as_ref()).await {
                Ok(embedding) => {
                    if let Some(cost) = embedding.cost {
                        costs.push(cost);
                    }
                    vectors.insert(text, embedding.vector);
                }
                Err(e) => warn!("Clustering embedding failed, using exact match: {}", e),
            }
        }

        let similarity = |a: &str, b: &str| -> Option<f32> {
            Some(cosine_similarity(vectors.get(a)?, vectors.get(b)?))
        };
        cluster_proposals(proposals, rules, &similarity)
    }
}

fn decision(kind: DecisionKind, cluster: &Cluster, round: u32) -> Decision {
    Decision {
        kind,
        proposal: cluster.representative().clone(),
        supporters: cluster.models(),
        round,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeGateway, KeywordEmbedder, engine_with, proposal_json};
    use conclave_domain::{CostKind, HistoryEntry, ModelHistory, ModelId};
    use rust_decimal::Decimal;
    use serde_json::json;

    fn slices(models: &[&str]) -> Vec<ModelSlice> {
        models
            .iter()
            .map(|m| {
                ModelSlice::new(
                    ModelId::from(*m),
                    ModelHistory::from_chronological(vec![HistoryEntry::message(
                        "user",
                        format!("hello {}", m),
                    )]),
                )
            })
            .collect()
    }

    fn aggregator(gateway: Arc<FakeGateway>, max_rounds: u32) -> ConsensusAggregator {
        let engine = engine_with(gateway, |c| c.with_max_rounds(max_rounds));
        ConsensusAggregator::new(
            engine,
            Arc::new(KeywordEmbedder::with_cost(Decimal::new(1, 3))),
            ConsensusParams {
                max_rounds,
                ..Default::default()
            },
        )
    }

    fn id(m: &str) -> ModelId {
        ModelId::from(m)
    }

    #[tokio::test]
    async fn test_three_of_four_reach_quorum() {
        let orient = proposal_json("orient", json!({}));
        let gateway = Arc::new(
            FakeGateway::new()
                .with_response(&id("m1"), &orient)
                .with_response(&id("m2"), &orient)
                .with_response(&id("m3"), &proposal_json("wait", json!({})))
                .with_response(&id("m4"), &orient),
        );
        let outcome = aggregator(gateway, 4)
            .run(ConsensusInput {
                slices: slices(&["m1", "m2", "m3", "m4"]),
                ..Default::default()
            })
            .await;

        let decision = outcome.result.unwrap();
        assert_eq!(decision.kind, DecisionKind::Consensus);
        assert_eq!(decision.proposal.action, "orient");
        assert_eq!(decision.supporters, vec![id("m1"), id("m2"), id("m4")]);
        assert_eq!(decision.round, 1);
        assert_eq!(outcome.slices.len(), 4);
    }

    #[tokio::test]
    async fn test_refinement_round_reaches_consensus() {
        let gateway = Arc::new(
            FakeGateway::new()
                .with_response(&id("m1"), &proposal_json("orient", json!({})))
                .with_response(&id("m2"), &proposal_json("wait", json!({})))
                .with_response(&id("m1"), &proposal_json("wait", json!({})))
                .with_response(&id("m2"), &proposal_json("wait", json!({}))),
        );
        let outcome = aggregator(gateway.clone(), 4)
            .run(ConsensusInput {
                slices: slices(&["m1", "m2"]),
                ..Default::default()
            })
            .await;

        let decision = outcome.result.unwrap();
        assert_eq!(decision.kind, DecisionKind::Consensus);
        assert_eq!(decision.proposal.action, "wait");
        assert_eq!(decision.round, 2);

        // each model keeps its own history in the refinement round
        let second = &gateway.calls_for("m2")[1];
        let text = &second.messages.last().unwrap().content;
        assert!(text.contains("hello m2"));
        assert!(!text.contains("hello m1"));
        assert!(text.contains("[Consensus round 2 of 4]"));
    }

    #[tokio::test]
    async fn test_forced_decision_at_max_rounds() {
        let gateway = Arc::new(
            FakeGateway::new()
                .with_response(&id("m1"), &proposal_json("orient", json!({})))
                .with_response(&id("m2"), &proposal_json("wait", json!({})))
                .with_response(&id("m1"), &proposal_json("todo", json!({})))
                .with_response(&id("m2"), &proposal_json("wait", json!({"x": 1}))),
        );
        let outcome = aggregator(gateway, 2)
            .run(ConsensusInput {
                slices: slices(&["m1", "m2"]),
                ..Default::default()
            })
            .await;

        let decision = outcome.result.unwrap();
        assert_eq!(decision.kind, DecisionKind::ForcedDecision);
        assert_eq!(decision.proposal.action, "todo");
        assert_eq!(decision.round, 2);
        assert_eq!(outcome.rounds, 2);
    }

    #[tokio::test]
    async fn test_all_models_failed_is_distinct() {
        let gateway = Arc::new(
            FakeGateway::new()
                .with_failure(&id("m1"), "down")
                .with_response(&id("m2"), "not json at all"),
        );
        let outcome = aggregator(gateway, 4)
            .run(ConsensusInput {
                slices: slices(&["m1", "m2"]),
                ..Default::default()
            })
            .await;

        assert_eq!(outcome.result, Err(ConsensusError::AllModelsFailed { round: 1 }));
        assert_eq!(outcome.slices.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_model_is_excluded_from_round() {
        let orient = proposal_json("orient", json!({}));
        let gateway = Arc::new(
            FakeGateway::new()
                .with_response(&id("m1"), &orient)
                .with_failure(&id("m2"), "timeout")
                .with_response(&id("m3"), &orient),
        );
        let outcome = aggregator(gateway, 4)
            .run(ConsensusInput {
                slices: slices(&["m1", "m2", "m3"]),
                ..Default::default()
            })
            .await;
        let decision = outcome.result.unwrap();
        assert_eq!(decision.kind, DecisionKind::Consensus);
        assert_eq!(decision.supporters, vec![id("m1"), id("m3")]);
    }

    #[tokio::test]
    async fn test_similar_task_descriptions_cluster_and_cost_embeddings() {
        let gateway = Arc::new(
            FakeGateway::new()
                .with_response(
                    &id("m1"),
                    &proposal_json("spawn_child", json!({"task": "write the parser tests"})),
                )
                .with_response(
                    &id("m2"),
                    &proposal_json("spawn_child", json!({"task": "add tests for the parser"})),
                ),
        );
        let context = CostContext::new("a-1".into(), "t-1".into(), "consensus");
        let outcome = aggregator(gateway, 1)
            .run(ConsensusInput {
                slices: slices(&["m1", "m2"]),
                cost_context: Some(context),
                ..Default::default()
            })
            .await;

        let decision = outcome.result.unwrap();
        assert_eq!(decision.kind, DecisionKind::Consensus);
        assert_eq!(decision.supporters.len(), 2);
        let embeddings: Vec<_> = outcome
            .costs
            .records()
            .iter()
            .filter(|r| r.kind == CostKind::Embedding)
            .collect();
        assert_eq!(embeddings.len(), 2);
        assert!(embeddings.iter().all(|r| r.context.purpose == "clustering"));
    }

    #[tokio::test]
    async fn test_embedding_failure_falls_back_to_exact() {
        let gateway = Arc::new(
            FakeGateway::new()
                .with_response(
                    &id("m1"),
                    &proposal_json("spawn_child", json!({"task": "FAIL parser tests"})),
                )
                .with_response(
                    &id("m2"),
                    &proposal_json("spawn_child", json!({"task": "FAIL tests for parser"})),
                ),
        );
        let outcome = aggregator(gateway, 1)
            .run(ConsensusInput {
                slices: slices(&["m1", "m2"]),
                ..Default::default()
            })
            .await;

        // distinct texts without embeddings never match: a tie, so forced
        let decision = outcome.result.unwrap();
        assert_eq!(decision.kind, DecisionKind::ForcedDecision);
        assert_eq!(decision.supporters, vec![id("m1")]);
    }

    #[tokio::test]
    async fn test_empty_pool() {
        let gateway = Arc::new(FakeGateway::new());
        let outcome = aggregator(gateway, 4).run(ConsensusInput::default()).await;
        assert_eq!(outcome.result, Err(ConsensusError::NoModels));
    }
}
