//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod action_executor;
pub mod broadcaster;
pub mod embedding;
pub mod llm_gateway;
pub mod persistence;
pub mod reflection;
