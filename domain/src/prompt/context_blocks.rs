//! Context blocks injected into every model's conversation
//!
//! The ACE block (accumulated lessons, then the working-state summary)
//! opens the conversation; todo, children and budget blocks close it, in
//! that order.

use crate::agent::budget::{BudgetMode, BudgetState};
use crate::agent::identity::AgentId;
use crate::memory::lesson::Lesson;
use crate::memory::working_state::WorkingState;
use serde::{Deserialize, Serialize};

/// One item of the agent's todo list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    #[serde(default)]
    pub done: bool,
}

impl TodoItem {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            done: false,
        }
    }
}

/// What a parent knows about one of its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSummary {
    pub agent_id: AgentId,
    pub task: String,
}

/// Rendered blocks for one model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextBlocks {
    pub ace: Option<String>,
    pub todo: Option<String>,
    pub children: Option<String>,
    pub budget: Option<String>,
}

impl ContextBlocks {
    /// Trailing blocks in injection order.
    pub fn trailing(&self) -> impl Iterator<Item = &str> {
        [&self.todo, &self.children, &self.budget]
            .into_iter()
            .filter_map(|b| b.as_deref())
    }
}

/// Lessons (highest confidence first) followed by the working state.
pub fn ace_block(lessons: &[Lesson], working_state: Option<&WorkingState>) -> Option<String> {
    let summary = working_state.map(|s| s.summary.trim()).filter(|s| !s.is_empty());
    if lessons.is_empty() && summary.is_none() {
        return None;
    }

    let mut block = String::new();
    if !lessons.is_empty() {
        let mut sorted: Vec<&Lesson> = lessons.iter().collect();
        sorted.sort_by(|a, b| b.confidence.cmp(&a.confidence));
        block.push_str("<lessons>\n");
        for lesson in sorted {
            block.push_str(&format!(
                "- ({}, confidence {}) {}\n",
                lesson.kind.as_str(),
                lesson.confidence,
                lesson.content
            ));
        }
        block.push_str("</lessons>");
    }
    if let Some(summary) = summary {
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(&format!("<working_state>\n{}\n</working_state>", summary));
    }
    Some(block)
}

pub fn todo_block(items: &[TodoItem]) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let mut block = String::from("<todos>\n");
    for item in items {
        let mark = if item.done { "x" } else { " " };
        block.push_str(&format!("- [{}] {}\n", mark, item.content));
    }
    block.push_str("</todos>");
    Some(block)
}

pub fn children_block(children: &[ChildSummary]) -> Option<String> {
    if children.is_empty() {
        return None;
    }
    let mut block = String::from("<children>\n");
    for child in children {
        block.push_str(&format!("- {}: {}\n", child.agent_id, child.task));
    }
    block.push_str("</children>");
    Some(block)
}

pub fn budget_block(budget: &BudgetState) -> Option<String> {
    if budget.mode == BudgetMode::Na {
        return None;
    }
    let allocated = budget
        .allocated
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unlimited".to_string());
    let mut block = format!(
        "<budget>\nallocated: {}\ncommitted: {}",
        allocated, budget.committed
    );
    if let Some(remaining) = budget.remaining() {
        block.push_str(&format!("\nremaining: {}", remaining));
    }
    if budget.over_budget() {
        block.push_str("\nstatus: OVER BUDGET, avoid actions that incur cost");
    }
    block.push_str("\n</budget>");
    Some(block)
}
