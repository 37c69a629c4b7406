//! Normalization of the `wait` field of a decided action

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What the agent does after an action completes successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitPolicy {
    /// Continue deciding as soon as the result arrives
    NoWait,
    /// Stay idle until an external event arrives
    UntilEvent,
    /// Stay idle until an external event arrives or the timer fires
    Timed { seconds: u64 },
}

impl WaitPolicy {
    /// Whether a successful result should be held back from triggering a
    /// new cycle.
    pub fn blocks(&self) -> bool {
        !matches!(self, WaitPolicy::NoWait)
    }

    pub fn timer_seconds(&self) -> Option<u64> {
        match self {
            WaitPolicy::Timed { seconds } => Some(*seconds),
            _ => None,
        }
    }
}

/// Outcome of normalizing a raw `wait` value
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedWait {
    pub policy: WaitPolicy,
    /// Set when the raw value could not be understood
    pub invalid: Option<String>,
}

impl NormalizedWait {
    fn valid(policy: WaitPolicy) -> Self {
        Self {
            policy,
            invalid: None,
        }
    }

    fn invalid(raw: &Value) -> Self {
        Self {
            policy: WaitPolicy::UntilEvent,
            invalid: Some(raw.to_string()),
        }
    }
}

/// Normalize a raw `wait` value.
///
/// - missing or `null` → no wait
/// - booleans and the strings `"true"` / `"false"` → as given
/// - positive numbers (or numeric strings) → timed wait in seconds, `0` → no wait
/// - negative or unparseable values → invalid, treated as waiting for an event
///
/// Self-contained actions produce no event to wait for, so any waiting
/// policy on them is silently corrected to no wait.
pub fn normalize_wait(raw: Option<&Value>, self_contained: bool) -> NormalizedWait {
    let normalized = match raw {
        None | Some(Value::Null) => NormalizedWait::valid(WaitPolicy::NoWait),
        Some(Value::Bool(true)) => NormalizedWait::valid(WaitPolicy::UntilEvent),
        Some(Value::Bool(false)) => NormalizedWait::valid(WaitPolicy::NoWait),
        Some(raw @ Value::Number(n)) => from_number(n.as_f64(), raw),
        Some(raw @ Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => NormalizedWait::valid(WaitPolicy::UntilEvent),
            "false" => NormalizedWait::valid(WaitPolicy::NoWait),
            other => from_number(other.parse::<f64>().ok(), raw),
        },
        Some(other) => NormalizedWait::invalid(other),
    };

    if self_contained && normalized.policy.blocks() {
        return NormalizedWait::valid(WaitPolicy::NoWait);
    }
    normalized
}

fn from_number(value: Option<f64>, raw: &Value) -> NormalizedWait {
    match value {
        Some(v) if v.is_finite() && v == 0.0 => NormalizedWait::valid(WaitPolicy::NoWait),
        Some(v) if v.is_finite() && v > 0.0 => NormalizedWait::valid(WaitPolicy::Timed {
            seconds: v.ceil() as u64,
        }),
        _ => NormalizedWait::invalid(raw),
    }
}
