//! Equivalence of proposals under a per-field rule table
//!
//! Two proposals are equivalent when their action kinds match and every
//! parameter matches under the rule configured for `(action, field)`.
//! Fields default to exact equality; free-text fields can be configured to
//! compare by semantic similarity instead.

use super::proposal::Proposal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Comparison applied to one parameter field
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum FieldRule {
    Exact,
    /// Cosine similarity of the embedded texts must reach `threshold`
    Similar { threshold: f32 },
    /// Field does not take part in the comparison
    Ignore,
}

/// Similarity oracle for two texts; `None` when it cannot tell.
pub type SimilarityFn<'a> = dyn Fn(&str, &str) -> Option<f32> + 'a;

/// action kind → field → rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchRules {
    rules: BTreeMap<String, BTreeMap<String, FieldRule>>,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self::exact().with_rule("spawn_child", "task", FieldRule::Similar { threshold: 0.90 })
    }
}

impl MatchRules {
    /// Every field compared exactly.
    pub fn exact() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, action: &str, field: &str, rule: FieldRule) -> Self {
        self.rules
            .entry(action.to_string())
            .or_default()
            .insert(field.to_string(), rule);
        self
    }

    pub fn rule_for(&self, action: &str, field: &str) -> FieldRule {
        self.rules
            .get(action)
            .and_then(|fields| fields.get(field))
            .copied()
            .unwrap_or(FieldRule::Exact)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, FieldRule)> {
        self.rules.iter().flat_map(|(action, fields)| {
            fields
                .iter()
                .map(move |(field, rule)| (action.as_str(), field.as_str(), *rule))
        })
    }

    /// Texts that will be compared by similarity, so they can be embedded
    /// up front.
    pub fn similarity_texts<'a>(&self, proposals: impl IntoIterator<Item = &'a Proposal>) -> BTreeSet<String> {
        let mut texts = BTreeSet::new();
        for proposal in proposals {
            let Some(fields) = self.rules.get(&proposal.action) else {
                continue;
            };
            for (field, rule) in fields {
                if let FieldRule::Similar { .. } = rule
                    && let Some(text) = proposal.param_str(field)
                {
                    texts.insert(text.to_string());
                }
            }
        }
        texts
    }

    /// Whether `a` and `b` propose the same action.
    ///
    /// When the oracle cannot score a pair, the field falls back to exact
    /// equality.
    pub fn equivalent(&self, a: &Proposal, b: &Proposal, similarity: &SimilarityFn<'_>) -> bool {
        if a.action != b.action {
            return false;
        }
        let (Some(a_params), Some(b_params)) = (a.params.as_object(), b.params.as_object()) else {
            return a.params == b.params;
        };

        let fields: BTreeSet<&String> = a_params.keys().chain(b_params.keys()).collect();
        fields.into_iter().all(|field| {
            let left = a_params.get(field);
            let right = b_params.get(field);
            match self.rule_for(&a.action, field) {
                FieldRule::Ignore => true,
                FieldRule::Exact => left == right,
                FieldRule::Similar { threshold } => match (left, right) {
                    (Some(Value::String(l)), Some(Value::String(r))) => {
                        l == r || similarity(l, r).is_some_and(|score| score >= threshold)
                    }
                    _ => left == right,
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn never(_: &str, _: &str) -> Option<f32> {
        None
    }

    #[test]
    fn test_different_actions_never_match() {
        let rules = MatchRules::default();
        let a = Proposal::new("orient", json!({}));
        let b = Proposal::new("wait", json!({}));
        assert!(!rules.equivalent(&a, &b, &never));
    }

    #[test]
    fn test_exact_fields() {
        let rules = MatchRules::default();
        let a = Proposal::new("execute_shell", json!({"command": "ls"}));
        let b = Proposal::new("execute_shell", json!({"command": "ls"}));
        let c = Proposal::new("execute_shell", json!({"command": "ls -la"}));
        assert!(rules.equivalent(&a, &b, &never));
        assert!(!rules.equivalent(&a, &c, &never));
    }

    #[test]
    fn test_reasoning_and_wait_do_not_matter() {
        let rules = MatchRules::default();
        let a = Proposal::new("orient", json!({})).with_reasoning("one").with_wait(json!(true));
        let b = Proposal::new("orient", json!({})).with_reasoning("two");
        assert!(rules.equivalent(&a, &b, &never));
    }

    #[test]
    fn test_similar_field_uses_oracle() {
        let rules = MatchRules::default();
        let a = Proposal::new("spawn_child", json!({"task": "write the parser", "budget": "1.00"}));
        let b = Proposal::new("spawn_child", json!({"task": "implement the parser", "budget": "1.00"}));

        assert!(rules.equivalent(&a, &b, &|_, _| Some(0.95)));
        assert!(!rules.equivalent(&a, &b, &|_, _| Some(0.50)));
        // oracle failure degrades to exact matching
        assert!(!rules.equivalent(&a, &b, &never));
        assert!(rules.equivalent(&a, &a.clone(), &never));
    }

    #[test]
    fn test_similar_rule_does_not_relax_other_fields() {
        let rules = MatchRules::default();
        let a = Proposal::new("spawn_child", json!({"task": "x", "budget": "1.00"}));
        let b = Proposal::new("spawn_child", json!({"task": "x", "budget": "2.00"}));
        assert!(!rules.equivalent(&a, &b, &|_, _| Some(1.0)));
    }

    #[test]
    fn test_ignore_rule() {
        let rules = MatchRules::exact().with_rule("fetch_web", "timeout", FieldRule::Ignore);
        let a = Proposal::new("fetch_web", json!({"url": "https://a", "timeout": 5}));
        let b = Proposal::new("fetch_web", json!({"url": "https://a"}));
        assert!(rules.equivalent(&a, &b, &never));
    }

    #[test]
    fn test_similarity_texts() {
        let rules = MatchRules::default();
        let proposals = [
            Proposal::new("spawn_child", json!({"task": "a"})),
            Proposal::new("spawn_child", json!({"task": "b"})),
            Proposal::new("orient", json!({"task": "ignored"})),
        ];
        let texts = rules.similarity_texts(proposals.iter());
        assert_eq!(texts.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
