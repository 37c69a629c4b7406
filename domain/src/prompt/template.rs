//! Prompt templates for reflection
//!
//! A reflection pass reads the oldest part of a history that is about to be
//! dropped and answers with a JSON object:
//!
//! ```json
//! {"lessons": [{"type": "factual", "content": "...", "confidence": 2}],
//!  "working_state": "..."}
//! ```

use crate::consensus::extract_json_object;
use crate::history::HistoryEntry;
use crate::memory::Lesson;
use serde_json::Value;

/// Templates for the reflection prompt and its answer
pub struct PromptTemplate;

impl PromptTemplate {
    pub fn reflection_system() -> &'static str {
        r#"You maintain the long-term memory of an autonomous agent.
The entries below are about to be removed from the agent's context.
Extract what the agent must not forget: durable facts, behaviours that worked or failed, and strategic insights.
Then summarise the agent's current working state in a few sentences."#
    }

    /// User prompt listing `entries` oldest first.
    pub fn reflection_prompt(entries: &[HistoryEntry]) -> String {
        let mut prompt = String::from("Entries being removed, oldest first:\n");
        for entry in entries {
            let who = entry.sender.as_deref().unwrap_or("");
            prompt.push_str(&format!(
                "\n[{:?}{}{}]\n{}\n",
                entry.kind,
                if who.is_empty() { "" } else { " from " },
                who,
                entry.display_text()
            ));
        }
        prompt.push_str(
            r#"
Answer with a single JSON object:
{"lessons": [{"type": "factual" | "behavioral" | "strategic", "content": "...", "confidence": 1}],
 "working_state": "..."}
Use an empty list when there is nothing worth keeping."#,
        );
        prompt
    }

    /// Parse a reflection answer into lessons and working-state summaries.
    ///
    /// `working_state` may be a string or a list of strings. Lessons that do
    /// not deserialize are skipped.
    pub fn parse_reflection(response: &str) -> Option<(Vec<Lesson>, Vec<String>)> {
        let obj = extract_json_object(response)?;

        let lessons = match obj.get("lessons") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| serde_json::from_value::<Lesson>(item.clone()).ok())
                .filter(|lesson| !lesson.content.trim().is_empty())
                .collect(),
            _ => Vec::new(),
        };
        let states = match obj.get("working_state") {
            Some(Value::String(state)) if !state.trim().is_empty() => vec![state.clone()],
            Some(Value::Array(states)) => states
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
        Some((lessons, states))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LessonKind;

    #[test]
    fn test_prompt_lists_entries_in_order() {
        let entries = vec![
            HistoryEntry::message("user", "build the parser"),
            HistoryEntry::event("Child agent c-1 failed: timeout"),
        ];
        let prompt = PromptTemplate::reflection_prompt(&entries);
        let first = prompt.find("build the parser").unwrap();
        let second = prompt.find("Child agent c-1 failed").unwrap();
        assert!(first < second);
        assert!(prompt.contains("from user"));
    }

    #[test]
    fn test_parse_reflection() {
        let response = r#"```json
{"lessons": [{"type": "behavioral", "content": "run tests before deploying", "confidence": 3},
             {"content": ""}, 42],
 "working_state": "parser half done"}
```"#;
        let (lessons, states) = PromptTemplate::parse_reflection(response).unwrap();
        assert_eq!(lessons.len(), 1);
        assert_eq!(lessons[0].kind, LessonKind::Behavioral);
        assert_eq!(lessons[0].confidence, 3);
        assert_eq!(states, vec!["parser half done".to_string()]);
    }

    #[test]
    fn test_parse_reflection_without_json() {
        assert!(PromptTemplate::parse_reflection("nothing to add").is_none());
    }
}
