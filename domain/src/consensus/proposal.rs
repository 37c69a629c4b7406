//! Proposed actions and parsing of model responses

use crate::core::error::DomainError;
use crate::core::model::ModelId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One model's proposed next action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub action: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    /// Raw `wait` value, normalized only once the proposal wins
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<Value>,
    #[serde(default)]
    pub reasoning: String,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

impl Proposal {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
            wait: None,
            reasoning: String::new(),
        }
    }

    pub fn with_wait(mut self, wait: Value) -> Self {
        self.wait = Some(wait);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    /// A string-valued parameter, if present.
    pub fn param_str(&self, field: &str) -> Option<&str> {
        self.params.get(field).and_then(Value::as_str)
    }
}

/// A proposal tagged with the model that made it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelProposal {
    pub model: ModelId,
    pub proposal: Proposal,
}

impl ModelProposal {
    pub fn new(model: ModelId, proposal: Proposal) -> Self {
        Self { model, proposal }
    }
}

/// Parse a model response into a [`Proposal`].
///
/// Accepted shapes, tried in order:
/// 1. the whole response is a JSON object
/// 2. a fenced code block (` ```json ` or bare ` ``` `) containing one
/// 3. the outermost `{ ... }` span inside surrounding prose
pub fn parse_proposal(model: &ModelId, response: &str) -> Result<Proposal, DomainError> {
    let invalid = |reason: &str| DomainError::InvalidProposal {
        model: model.to_string(),
        reason: reason.to_string(),
    };

    let value = candidates(response)
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<Value>(candidate.trim()).ok())
        .ok_or_else(|| invalid("response does not contain a JSON object"))?;

    let Value::Object(mut obj) = value else {
        return Err(invalid("response JSON is not an object"));
    };

    let action = match obj.remove("action") {
        Some(Value::String(action)) if !action.trim().is_empty() => action.trim().to_string(),
        _ => return Err(invalid("missing \"action\"")),
    };
    let params = match obj.remove("params") {
        None | Some(Value::Null) => empty_params(),
        Some(params @ Value::Object(_)) => params,
        Some(_) => return Err(invalid("\"params\" must be an object")),
    };
    let wait = obj.remove("wait").filter(|w| !w.is_null());
    let reasoning = match obj.remove("reasoning") {
        Some(Value::String(reasoning)) => reasoning,
        _ => String::new(),
    };

    Ok(Proposal {
        action,
        params,
        wait,
        reasoning,
    })
}

/// First JSON object found in `response`, trying the same shapes as
/// [`parse_proposal`].
pub fn extract_json_object(response: &str) -> Option<serde_json::Map<String, Value>> {
    candidates(response)
        .into_iter()
        .find_map(|candidate| match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(Value::Object(obj)) => Some(obj),
            _ => None,
        })
}

fn candidates(response: &str) -> Vec<&str> {
    let mut found = vec![response];

    let mut in_block = false;
    let mut start = 0;
    let mut offset = 0;
    for line in response.split_inclusive('\n') {
        let trimmed = line.trim();
        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            start = offset + line.len();
        } else if in_block && trimmed == "```" {
            in_block = false;
            found.push(&response[start..offset]);
        }
        offset += line.len();
    }

    if let (Some(open), Some(close)) = (response.find('{'), response.rfind('}'))
        && open < close
    {
        found.push(&response[open..=close]);
    }
    found
}
