//! Reflection through the LLM gateway
//!
//! The model whose history is being condensed reflects on its own oldest
//! entries, at temperature 0.

use async_trait::async_trait;
use conclave_application::{LlmGateway, QueryOptions, Reflection, ReflectionError, ReflectionOptions, Reflector};
use conclave_domain::prompt::PromptTemplate;
use conclave_domain::{CostKind, CostRecord, HistoryEntry, Message, ModelId};
use std::sync::Arc;
use tracing::debug;

pub struct GatewayReflector {
    gateway: Arc<dyn LlmGateway>,
}

impl GatewayReflector {
    pub fn new(gateway: Arc<dyn LlmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl Reflector for GatewayReflector {
    async fn reflect(
        &self,
        entries: &[HistoryEntry],
        model: &ModelId,
        options: &ReflectionOptions,
    ) -> Result<Reflection, ReflectionError> {
        if entries.is_empty() {
            return Ok(Reflection::default());
        }

        let messages = vec![
            Message::system(PromptTemplate::reflection_system()),
            Message::user(PromptTemplate::reflection_prompt(entries)),
        ];
        let query = QueryOptions {
            temperature: Some(0.0),
            round: 0,
            cost_context: options.cost_context.clone(),
        };
        let outcome = self
            .gateway
            .query(&messages, std::slice::from_ref(model), &query)
            .await
            .map_err(|e| ReflectionError::Failed(e.to_string()))?;

        let Some(response) = outcome.successful.into_iter().find(|r| &r.model == model) else {
            let reason = outcome
                .failed
                .into_iter()
                .find(|(m, _)| m == model)
                .map(|(_, reason)| reason)
                .unwrap_or_else(|| "no response".to_string());
            return Err(ReflectionError::Failed(reason));
        };

        let (lessons, state) = PromptTemplate::parse_reflection(&response.content)
            .ok_or_else(|| ReflectionError::InvalidOutput(response.content.clone()))?;
        debug!(model = %model, lessons = lessons.len(), "Reflection parsed");

        let cost = match (&options.cost_context, response.usage) {
            (Some(context), Some(usage)) => Some(
                CostRecord::new(context.for_purpose("reflection"), CostKind::Reflection, usage.cost)
                    .with_model(model.clone())
                    .with_tokens(usage.input_tokens, usage.output_tokens),
            ),
            _ => None,
        };
        Ok(Reflection { lessons, state, cost })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedGateway;
    use conclave_domain::{AgentId, CostContext, LessonKind, TaskId};
    use rust_decimal::Decimal;

    fn gateway(script: &str) -> Arc<dyn LlmGateway> {
        Arc::new(ScriptedGateway::from_json(script).unwrap())
    }

    fn entries() -> Vec<HistoryEntry> {
        vec![
            HistoryEntry::message("user", "set up CI"),
            HistoryEntry::event("workflow file written"),
        ]
    }

    #[tokio::test]
    async fn test_reflection_is_parsed_and_priced() {
        let reflector = GatewayReflector::new(gateway(
            r#"{"default": {"lessons": [{"type": "strategic", "content": "CI first"}],
                            "working_state": "CI configured"},
                "cost": "0.01"}"#,
        ));
        let options = ReflectionOptions {
            cost_context: Some(CostContext::new(AgentId::from("a"), TaskId::from("t"), "condense")),
        };

        let reflection = reflector
            .reflect(&entries(), &ModelId::from("m"), &options)
            .await
            .unwrap();
        assert_eq!(reflection.lessons.len(), 1);
        assert_eq!(reflection.lessons[0].kind, LessonKind::Strategic);
        assert_eq!(reflection.state, vec!["CI configured".to_string()]);

        let cost = reflection.cost.unwrap();
        assert_eq!(cost.kind, CostKind::Reflection);
        assert_eq!(cost.amount, Decimal::new(1, 2));
        assert_eq!(cost.context.purpose, "reflection");
    }

    #[tokio::test]
    async fn test_failures() {
        let model = ModelId::from("m");
        let options = ReflectionOptions::default();

        let failing = GatewayReflector::new(gateway(r#"{"responses": {"m": [{"fail": "overloaded"}]}}"#));
        assert_eq!(
            failing.reflect(&entries(), &model, &options).await.unwrap_err(),
            ReflectionError::Failed("overloaded".to_string())
        );

        let rambling = GatewayReflector::new(gateway(r#"{"default": "I learned a lot"}"#));
        assert!(matches!(
            rambling.reflect(&entries(), &model, &options).await.unwrap_err(),
            ReflectionError::InvalidOutput(_)
        ));
    }

    #[tokio::test]
    async fn test_nothing_to_reflect_on() {
        let reflector = GatewayReflector::new(gateway("{}"));
        let reflection = reflector
            .reflect(&[], &ModelId::from("m"), &ReflectionOptions::default())
            .await
            .unwrap();
        assert_eq!(reflection, Reflection::default());
    }
}
