//! LLM gateway adapters

mod scripted;

pub use scripted::{ScriptError, ScriptedGateway};
