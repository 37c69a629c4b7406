//! Gateway that replays responses from a script file
//!
//! Used for offline runs and demos: no provider is contacted. The script is
//! a JSON document:
//!
//! ```json
//! {
//!   "default": {"action": "wait", "params": {}, "reasoning": "idle", "wait": true},
//!   "responses": {
//!     "model-a": [{"action": "orient", "params": {}, "reasoning": "look around"}, {"fail": "rate limited"}]
//!   },
//!   "unavailable": ["model-z"],
//!   "cost": "0.002"
//! }
//! ```
//!
//! Each model consumes its own list in order, then falls back to `default`.
//! Responses may be strings or JSON objects; `{"fail": reason}` makes that
//! call fail for the model.

use async_trait::async_trait;
use conclave_application::{GatewayError, LlmGateway, ModelResponse, QueryOptions, QueryOutcome, Usage};
use conclave_domain::{Message, ModelId};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Could not read script {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid script: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Respond(String),
    Fail(String),
}

impl Step {
    fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Step::Respond(text),
            Value::Object(map) if map.len() == 1 && map.contains_key("fail") => Step::Fail(
                map.get("fail")
                    .and_then(Value::as_str)
                    .unwrap_or("scripted failure")
                    .to_string(),
            ),
            other => Step::Respond(other.to_string()),
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawScript {
    default: Option<Value>,
    responses: HashMap<String, Vec<Value>>,
    unavailable: Vec<String>,
    cost: Option<String>,
}

pub struct ScriptedGateway {
    scripts: Mutex<HashMap<ModelId, VecDeque<Step>>>,
    default: Option<Step>,
    unavailable: BTreeSet<ModelId>,
    cost: Option<Decimal>,
}

impl ScriptedGateway {
    pub fn from_json(raw: &str) -> Result<Self, ScriptError> {
        let script: RawScript = serde_json::from_str(raw).map_err(|e| ScriptError::Parse(e.to_string()))?;
        let cost = script
            .cost
            .map(|c| Decimal::from_str(c.trim()).map_err(|e| ScriptError::Parse(format!("cost: {}", e))))
            .transpose()?;
        Ok(Self {
            scripts: Mutex::new(
                script
                    .responses
                    .into_iter()
                    .map(|(model, steps)| (ModelId::from(model), steps.into_iter().map(Step::from_value).collect()))
                    .collect(),
            ),
            default: script.default.map(Step::from_value),
            unavailable: script.unavailable.into_iter().map(ModelId::from).collect(),
            cost,
        })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    fn next_step(&self, model: &ModelId) -> Result<Option<Step>, GatewayError> {
        let mut scripts = self
            .scripts
            .lock()
            .map_err(|_| GatewayError::Other("script state poisoned".to_string()))?;
        let step = scripts.get_mut(model).and_then(VecDeque::pop_front);
        Ok(step.or_else(|| self.default.clone()))
    }

    fn usage(&self, messages: &[Message], content: &str) -> Option<Usage> {
        self.cost.map(|cost| Usage {
            input_tokens: messages.iter().map(|m| m.content.split_whitespace().count() as u64).sum(),
            output_tokens: content.split_whitespace().count() as u64,
            cost,
        })
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn query(
        &self,
        messages: &[Message],
        models: &[ModelId],
        options: &QueryOptions,
    ) -> Result<QueryOutcome, GatewayError> {
        let mut outcome = QueryOutcome::default();
        for model in models {
            if self.unavailable.contains(model) {
                outcome.failed.push((model.clone(), "model not available".to_string()));
                continue;
            }
            match self.next_step(model)? {
                Some(Step::Respond(content)) => {
                    debug!(model = %model, round = options.round, "Scripted response");
                    outcome.successful.push(ModelResponse {
                        model: model.clone(),
                        usage: self.usage(messages, &content),
                        content,
                    });
                }
                Some(Step::Fail(reason)) => outcome.failed.push((model.clone(), reason)),
                None => outcome.failed.push((model.clone(), "script exhausted".to_string())),
            }
        }
        Ok(outcome)
    }

    fn is_available(&self, model: &ModelId) -> bool {
        !self.unavailable.contains(model)
    }
}
