//! Provider message construction
//!
//! - [`message`]: roles, messages and an alternation-keeping builder
//! - [`context_blocks`]: lessons/working-state, todo, children and budget blocks
//! - [`format`]: history → messages, untrusted-output fencing
//! - [`template`]: reflection prompt and answer parsing

pub mod context_blocks;
pub mod format;
pub mod message;
pub mod template;

pub use context_blocks::{
    ChildSummary, ContextBlocks, TodoItem, ace_block, budget_block, children_block, todo_block,
};
pub use format::{build_messages, entry_to_message, history_to_conversation, wrap_untrusted};
pub use message::{Conversation, Message, Role};
pub use template::PromptTemplate;
