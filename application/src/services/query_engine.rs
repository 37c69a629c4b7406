//! Per-model querying
//!
//! Every model sees its own history, so each query builds a private message
//! list: history, the ACE block in the first user turn, the trailing context
//! blocks and (during refinement) the refinement prompt in the last user
//! turn. Oversized histories are condensed before the query, and a provider
//! context-length rejection gets exactly one condense-and-retry.

use super::condenser::{CondenseError, Condenser};
use crate::config::ContextLimits;
use crate::ports::llm_gateway::{GatewayError, LlmGateway, ModelResponse, QueryOptions};
use conclave_domain::prompt::{ace_block, build_messages};
use conclave_domain::{
    ActionCatalog, ContextBlocks, CostAccumulator, CostContext, CostKind, CostRecord, Lesson,
    Message, ModelHistory, ModelId, TemperatureSchedule, WorkingState,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Context length exceeded for {0} after condensing")]
    ContextLengthExceeded(ModelId),

    #[error("Model {model} failed: {reason}")]
    ModelFailed { model: ModelId, reason: String },

    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// One model's slice of agent state for the duration of a cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSlice {
    pub model: ModelId,
    pub history: ModelHistory,
    pub lessons: Vec<Lesson>,
    pub working_state: Option<WorkingState>,
    /// History was replaced by a condensed version
    pub condensed: bool,
    /// Lessons or working state changed
    pub memory_changed: bool,
}

impl ModelSlice {
    pub fn new(model: ModelId, history: ModelHistory) -> Self {
        Self {
            model,
            history,
            lessons: Vec::new(),
            working_state: None,
            condensed: false,
            memory_changed: false,
        }
    }
}

/// Per-query options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// 1-based consensus round
    pub round: u32,
    pub refinement: Option<String>,
    pub force_condense: bool,
    /// Todo, children and budget blocks (the ACE block is per model)
    pub blocks: ContextBlocks,
    pub cost_context: Option<CostContext>,
}

#[derive(Clone)]
pub struct PerModelQueryEngine {
    gateway: Arc<dyn LlmGateway>,
    condenser: Condenser,
    catalog: ActionCatalog,
    temperature: TemperatureSchedule,
    limits: ContextLimits,
    total_rounds: u32,
}

impl PerModelQueryEngine {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        condenser: Condenser,
        catalog: ActionCatalog,
        temperature: TemperatureSchedule,
        limits: ContextLimits,
        total_rounds: u32,
    ) -> Self {
        Self {
            gateway,
            condenser,
            catalog,
            temperature,
            limits,
            total_rounds,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn LlmGateway> {
        &self.gateway
    }

    pub fn condenser(&self) -> &Condenser {
        &self.condenser
    }

    pub fn build_messages(&self, slice: &ModelSlice, request: &QueryRequest) -> Vec<Message> {
        let blocks = ContextBlocks {
            ace: ace_block(&slice.lessons, slice.working_state.as_ref()),
            ..request.blocks.clone()
        };
        build_messages(
            &slice.history,
            &self.catalog,
            &blocks,
            request.refinement.as_deref(),
        )
    }

    pub fn temperature_for(&self, model: &ModelId, round: u32) -> f32 {
        self.temperature.temperature(model, round, self.total_rounds)
    }

    /// Query one model, condensing its slice as needed.
    pub async fn query(
        &self,
        slice: &mut ModelSlice,
        request: &QueryRequest,
        costs: &mut CostAccumulator,
    ) -> Result<ModelResponse, QueryError> {
        let tokens = self.condenser.estimator().estimate_history(&slice.history);
        let limit = self.limits.for_model(&slice.model);
        if request.force_condense || tokens > limit {
            debug!(model = %slice.model, "History at {} tokens (limit {}), condensing", tokens, limit);
            if let Err(e) = self.condense(slice, request, costs).await {
                warn!(model = %slice.model, "Pre-query condensation failed: {}", e);
            }
        }

        let options = QueryOptions {
            temperature: Some(self.temperature_for(&slice.model, request.round)),
            round: request.round.max(1),
            cost_context: request.cost_context.clone(),
        };

        match self.query_once(slice, request, &options, costs).await {
            Err(QueryError::Gateway(GatewayError::ContextLengthExceeded(_))) => {
                info!(model = %slice.model, "Context length exceeded, condensing and retrying once");
                self.condense(slice, request, costs)
                    .await
                    .map_err(|_| QueryError::ContextLengthExceeded(slice.model.clone()))?;
                match self.query_once(slice, request, &options, costs).await {
                    Err(QueryError::Gateway(GatewayError::ContextLengthExceeded(_))) => {
                        Err(QueryError::ContextLengthExceeded(slice.model.clone()))
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn query_once(
        &self,
        slice: &ModelSlice,
        request: &QueryRequest,
        options: &QueryOptions,
        costs: &mut CostAccumulator,
    ) -> Result<ModelResponse, QueryError> {
        let messages = self.build_messages(slice, request);
        let outcome = self
            .gateway
            .query(&messages, std::slice::from_ref(&slice.model), options)
            .await?;

        if let Some(response) = outcome.successful.into_iter().find(|r| r.model == slice.model) {
            if let (Some(usage), Some(context)) = (&response.usage, &request.cost_context) {
                costs.push(
                    CostRecord::new(context.for_purpose("consensus"), CostKind::Query, usage.cost)
                        .with_model(slice.model.clone())
                        .with_tokens(usage.input_tokens, usage.output_tokens),
                );
            }
            return Ok(response);
        }

        let reason = outcome
            .failed
            .into_iter()
            .find(|(m, _)| *m == slice.model)
            .map(|(_, reason)| reason)
            .unwrap_or_else(|| "no response".to_string());
        Err(QueryError::ModelFailed {
            model: slice.model.clone(),
            reason,
        })
    }

    async fn condense(
        &self,
        slice: &mut ModelSlice,
        request: &QueryRequest,
        costs: &mut CostAccumulator,
    ) -> Result<(), CondenseError> {
        let condensed = self
            .condenser
            .condense(
                &slice.history,
                &slice.model,
                slice.lessons.clone(),
                slice.working_state.clone(),
                request.cost_context.as_ref(),
                costs,
            )
            .await;

        match condensed {
            Ok(condensed) => {
                slice.history = condensed.history;
                slice.lessons = condensed.lessons;
                slice.working_state = condensed.working_state;
                slice.condensed = true;
                slice.memory_changed |= condensed.reflected;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeGateway, engine_with};
    use conclave_domain::{HistoryEntry, Role};

    fn slice(model: &str, entries: usize) -> ModelSlice {
        let history = ModelHistory::from_chronological((0..entries).map(|i| {
            HistoryEntry::message("user", format!("message {} about the parser work", i))
        }));
        ModelSlice::new(ModelId::from(model), history)
    }

    #[tokio::test]
    async fn test_query_uses_descending_temperature() {
        let gateway = Arc::new(FakeGateway::new().with_default(r#"{"action":"orient"}"#));
        let engine = engine_with(gateway.clone(), |c| c);
        let mut s = slice("claude-x", 2);

        for round in 1..=4 {
            let request = QueryRequest {
                round,
                ..Default::default()
            };
            engine
                .query(&mut s, &request, &mut CostAccumulator::new())
                .await
                .unwrap();
        }

        let temps: Vec<f32> = gateway.calls().iter().map(|c| c.options.temperature.unwrap()).collect();
        assert_eq!(temps.len(), 4);
        assert!((temps[0] - 1.0).abs() < 1e-6);
        assert!(temps[3].abs() < 1e-6);
        assert!(temps.windows(2).all(|w| w[0] > w[1]));
    }

    #[tokio::test]
    async fn test_refinement_is_merged_into_last_user_turn() {
        let gateway = Arc::new(FakeGateway::new().with_default(r#"{"action":"orient"}"#));
        let engine = engine_with(gateway.clone(), |c| c);
        let mut s = slice("gpt-x", 1);
        let request = QueryRequest {
            round: 2,
            refinement: Some("REFINE NOW".to_string()),
            ..Default::default()
        };

        engine
            .query(&mut s, &request, &mut CostAccumulator::new())
            .await
            .unwrap();

        let call = &gateway.calls()[0];
        assert_eq!(call.messages.len(), 1);
        assert_eq!(call.messages[0].role, Role::User);
        assert!(call.messages[0].content.contains("message 0"));
        assert!(call.messages[0].content.ends_with("REFINE NOW"));
    }

    #[tokio::test]
    async fn test_context_overflow_condenses_and_retries_once() {
        let model = ModelId::from("claude-x");
        let gateway = Arc::new(
            FakeGateway::new()
                .with_error(&model, GatewayError::ContextLengthExceeded(model.clone()))
                .with_response(&model, r#"{"action":"orient"}"#),
        );
        let engine = engine_with(gateway.clone(), |c| c);
        let mut s = slice("claude-x", 20);
        let before = s.history.len();

        let response = engine
            .query(&mut s, &QueryRequest::default(), &mut CostAccumulator::new())
            .await
            .unwrap();

        assert!(response.content.contains("orient"));
        assert!(s.condensed);
        assert!(s.history.len() < before);
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_second_overflow_is_surfaced() {
        let model = ModelId::from("claude-x");
        let gateway = Arc::new(
            FakeGateway::new()
                .with_error(&model, GatewayError::ContextLengthExceeded(model.clone()))
                .with_error(&model, GatewayError::ContextLengthExceeded(model.clone()))
                .with_response(&model, r#"{"action":"orient"}"#),
        );
        let engine = engine_with(gateway.clone(), |c| c);
        let mut s = slice("claude-x", 20);

        let err = engine
            .query(&mut s, &QueryRequest::default(), &mut CostAccumulator::new())
            .await
            .unwrap_err();

        assert_eq!(err, QueryError::ContextLengthExceeded(model));
        assert_eq!(gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_history_is_condensed_before_query() {
        let gateway = Arc::new(FakeGateway::new().with_default(r#"{"action":"orient"}"#));
        let engine = engine_with(gateway.clone(), |c| c.with_context_limit("claude-x", 50));
        let mut s = slice("claude-x", 20);

        engine
            .query(&mut s, &QueryRequest::default(), &mut CostAccumulator::new())
            .await
            .unwrap();

        assert!(s.condensed);
        assert_eq!(gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_condensation_keeps_lessons_and_state() {
        let gateway = Arc::new(FakeGateway::new().with_default(r#"{"action":"orient"}"#));
        let engine = engine_with(gateway.clone(), |c| c.with_context_limit("claude-x", 50));
        let long = vec!["word"; 400].join(" ");
        let history = ModelHistory::from_chronological(vec![
            HistoryEntry::message("user", long.clone()),
            HistoryEntry::message("user", long),
        ]);
        let mut s = ModelSlice::new(ModelId::from("claude-x"), history);
        s.lessons = vec![Lesson::factual("tests live beside the code")];
        s.working_state = Some(WorkingState::new("reading the parser"));

        engine
            .query(&mut s, &QueryRequest::default(), &mut CostAccumulator::new())
            .await
            .unwrap();

        assert!(!s.condensed);
        assert_eq!(s.lessons.len(), 1);
        assert_eq!(s.working_state.as_ref().unwrap().summary, "reading the parser");
        let prompt = &gateway.calls()[0].messages[0].content;
        assert!(prompt.contains("tests live beside the code"));
        assert!(prompt.contains("reading the parser"));
    }

    #[tokio::test]
    async fn test_failed_model_is_reported() {
        let model = ModelId::from("gpt-x");
        let gateway = Arc::new(FakeGateway::new().with_failure(&model, "rate limited"));
        let engine = engine_with(gateway, |c| c);
        let mut s = slice("gpt-x", 1);

        let err = engine
            .query(&mut s, &QueryRequest::default(), &mut CostAccumulator::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            QueryError::ModelFailed {
                model,
                reason: "rate limited".to_string()
            }
        );
    }
}
