//! Agent runtime
//!
//! Each agent is one actor task that owns its memory, its pending actions
//! and its message queue:
//!
//! ```text
//! AgentHandle ──► mailbox ──► AgentActor ──► consensus job (background)
//!                    ▲            │
//!                    │            └──► router tasks ──► ActionExecutor
//!                    └──── results, command status, timers, budget
//! ```
//!
//! - [`EventBatcher`] decides when a consensus cycle runs
//! - [`DispatchTracker`] tracks pending actions and their routers
//! - [`AgentRegistry`] maps agent ids to handles and parents
//! - [`AgentRuntime`] spawns and supervises agents

pub mod actions;
mod actor;
pub mod batcher;
mod cycle;
pub mod dispatch;
pub mod handle;
mod mailbox;
pub mod messages;
pub mod registry;
pub mod router;
pub mod runtime;

pub use batcher::EventBatcher;
pub use dispatch::DispatchTracker;
pub use handle::AgentHandle;
pub use messages::{AgentMessage, AgentSnapshot, QueuedMessage};
pub use registry::{AgentRegistry, RegistryEntry, RegistryError};
pub use router::MonitorRef;
pub use runtime::{AgentError, AgentRuntime, AgentServices, AgentSpec, Collaborators};
