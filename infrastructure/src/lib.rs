//! Infrastructure layer for conclave
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer: configuration loading, file-backed persistence, the
//! JSONL event log, the local shell executor, and offline gateway,
//! embedding and reflection adapters.

pub mod actions;
pub mod config;
pub mod embedding;
pub mod gateway;
pub mod logging;
pub mod persistence;
pub mod reflection;

// Re-export commonly used types
pub use actions::LocalShellExecutor;
pub use config::{ConfigIssue, ConfigLoader, ConfigSource, FileAgentConfig, FileConfig, Severity};
pub use embedding::HashingEmbedder;
pub use gateway::{ScriptError, ScriptedGateway};
pub use logging::JsonlBroadcaster;
pub use persistence::{JsonFileStateStore, JsonlCostLedger};
pub use reflection::GatewayReflector;
