//! Agent runtime: wiring, spawning and supervision
//!
//! [`AgentServices`] bundles every service an agent uses and is shared by
//! all agents of one runtime. [`AgentRuntime::spawn`] validates the pool,
//! registers the agent, and starts its actor task; a supervisor task
//! unregisters the agent when it stops and tells the parent when it
//! crashed.

use super::actor::AgentActor;
use super::handle::AgentHandle;
use super::mailbox::Mailbox;
use super::registry::{AgentRegistry, RegistryEntry, RegistryError};
use crate::config::RuntimeConfig;
use crate::ports::action_executor::{ActionExecutor, NoActions};
use crate::ports::broadcaster::{Broadcaster, NoBroadcast};
use crate::ports::embedding::Embedder;
use crate::ports::llm_gateway::LlmGateway;
use crate::ports::persistence::{CostSink, NoCostSink, NoStateStore, SpendSource, StateStore};
use crate::ports::reflection::{NoReflection, Reflector};
use crate::services::{
    BudgetTracker, Condenser, ConsensusAggregator, LessonManager, PerModelQueryEngine,
    StateTransferEngine, StateTransferError,
};
use conclave_domain::{
    ActionCatalog, AgentId, BudgetState, CapabilityGroup, ModelId, TaskId, TokenError,
    TokenEstimator,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error("Agent {0} is not running")]
    NotRunning(AgentId),

    #[error("Agent {0} stopped before replying")]
    NoReply(AgentId),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Model pool rejected: {0}")]
    Pool(#[from] StateTransferError),
}

/// External collaborators of the runtime.
///
/// Only the gateway and embedder are required; everything else defaults to
/// a null implementation.
#[derive(Clone)]
pub struct Collaborators {
    pub gateway: Arc<dyn LlmGateway>,
    pub embedder: Arc<dyn Embedder>,
    pub reflector: Arc<dyn Reflector>,
    pub executor: Arc<dyn ActionExecutor>,
    pub store: Arc<dyn StateStore>,
    pub cost_sink: Arc<dyn CostSink>,
    pub spend: Option<Arc<dyn SpendSource>>,
    pub broadcaster: Arc<dyn Broadcaster>,
    /// Declared traits of every action the executor may be asked to run
    pub catalog: ActionCatalog,
}

impl Collaborators {
    pub fn new(gateway: Arc<dyn LlmGateway>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            gateway,
            embedder,
            reflector: Arc::new(NoReflection),
            executor: Arc::new(NoActions),
            store: Arc::new(NoStateStore),
            cost_sink: Arc::new(NoCostSink),
            spend: None,
            broadcaster: Arc::new(NoBroadcast),
            catalog: ActionCatalog::default(),
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_reflector(mut self, reflector: Arc<dyn Reflector>) -> Self {
        self.reflector = reflector;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_costs(mut self, sink: Arc<dyn CostSink>, spend: Option<Arc<dyn SpendSource>>) -> Self {
        self.cost_sink = sink;
        self.spend = spend;
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Arc<dyn Broadcaster>) -> Self {
        self.broadcaster = broadcaster;
        self
    }

    pub fn with_catalog(mut self, catalog: ActionCatalog) -> Self {
        self.catalog = catalog;
        self
    }
}

/// Services shared by every agent of a runtime
#[derive(Clone)]
pub struct AgentServices {
    pub config: RuntimeConfig,
    pub catalog: ActionCatalog,
    pub consensus: ConsensusAggregator,
    pub transfer: StateTransferEngine,
    pub budget: BudgetTracker,
    pub store: Arc<dyn StateStore>,
    pub executor: Arc<dyn ActionExecutor>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl AgentServices {
    /// Fails only when the tokenizer cannot be loaded.
    pub fn new(config: RuntimeConfig, collaborators: Collaborators) -> Result<Self, TokenError> {
        let Collaborators {
            gateway,
            embedder,
            reflector,
            executor,
            store,
            cost_sink,
            spend,
            broadcaster,
            catalog,
        } = collaborators;

        let lessons = LessonManager::new(embedder.clone(), config.lessons.clone());
        let condenser = Condenser::new(
            reflector,
            lessons,
            TokenEstimator::shared()?,
            config.condensation.clone(),
        );
        let engine = PerModelQueryEngine::new(
            gateway.clone(),
            condenser.clone(),
            catalog.clone(),
            config.temperature.clone(),
            config.context_limits.clone(),
            config.consensus.max_rounds,
        );

        Ok(Self {
            consensus: ConsensusAggregator::new(engine, embedder, config.consensus.clone()),
            transfer: StateTransferEngine::new(gateway, condenser, config.context_limits.clone()),
            budget: BudgetTracker::new(cost_sink, spend),
            catalog,
            store,
            executor,
            broadcaster,
            config,
        })
    }
}

/// Everything needed to start one agent
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub agent_id: AgentId,
    pub task_id: TaskId,
    pub task: String,
    pub pool: Vec<ModelId>,
    pub parent: Option<AgentHandle>,
    pub budget: BudgetState,
    pub capabilities: BTreeSet<CapabilityGroup>,
    /// Delivered as the first external message
    pub initial_message: Option<String>,
}

impl AgentSpec {
    pub fn new(task: impl Into<String>, pool: Vec<ModelId>) -> Self {
        Self {
            agent_id: AgentId::generate(),
            task_id: TaskId::generate(),
            task: task.into(),
            pool,
            parent: None,
            budget: BudgetState::na(),
            capabilities: CapabilityGroup::all(),
            initial_message: None,
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = agent_id;
        self
    }

    pub fn with_task_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    pub fn with_parent(mut self, parent: AgentHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_budget(mut self, budget: BudgetState) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_capabilities(mut self, capabilities: BTreeSet<CapabilityGroup>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.initial_message = Some(message.into());
        self
    }
}

struct RuntimeInner {
    registry: AgentRegistry,
    services: AgentServices,
}

#[derive(Clone)]
pub struct AgentRuntime {
    inner: Arc<RuntimeInner>,
}

impl AgentRuntime {
    pub fn new(services: AgentServices) -> Self {
        Self {
            inner: Arc::new(RuntimeInner {
                registry: AgentRegistry::new(),
                services,
            }),
        }
    }

    pub fn services(&self) -> &AgentServices {
        &self.inner.services
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.inner.registry
    }

    /// Start an agent. Must be called from within a Tokio runtime.
    ///
    /// When the agent has a parent, a failure is also reported to the
    /// parent as a spawn-failure notification.
    pub fn spawn(&self, spec: AgentSpec) -> Result<AgentHandle, AgentError> {
        let agent_id = spec.agent_id.clone();
        let parent = spec.parent.clone();
        self.start(spec).inspect_err(|e| {
            warn!(agent_id = %agent_id, "Agent failed to start: {}", e);
            if let Some(parent) = parent
                && parent.notify_spawn_failed(agent_id.clone(), e.to_string()).is_err()
            {
                debug!(agent_id = %agent_id, "Parent is gone, spawn failure not delivered");
            }
        })
    }

    /// Start an agent without notifying its parent on failure. Used by
    /// callers that report the failure themselves.
    pub(super) fn start(&self, spec: AgentSpec) -> Result<AgentHandle, AgentError> {
        let pool = self.inner.services.transfer.validate(&spec.pool)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = AgentHandle::new(spec.agent_id.clone(), tx.clone());
        let parent_id = spec.parent.as_ref().map(|p| p.id().clone());
        self.inner
            .registry
            .register(RegistryEntry::new(handle.clone(), parent_id))?;

        if let Some(message) = &spec.initial_message {
            let sender = if spec.parent.is_some() { "parent" } else { "user" };
            handle.send_message(sender, message.clone())?;
        }

        info!(agent_id = %spec.agent_id, task_id = %spec.task_id, pool = ?pool, "Starting agent");
        let agent_id = spec.agent_id.clone();
        let parent = spec.parent.clone();
        let actor = AgentActor::new(spec, pool, Mailbox::new(rx, tx), self.clone(), handle.clone());
        let join = tokio::spawn(actor.run());
        self.supervise(agent_id, parent, join);
        Ok(handle)
    }

    fn supervise(&self, agent_id: AgentId, parent: Option<AgentHandle>, join: JoinHandle<()>) {
        let runtime = self.clone();
        tokio::spawn(async move {
            let outcome = join.await;
            if let Err(e) = runtime.inner.registry.unregister(&agent_id) {
                warn!(agent_id = %agent_id, "Could not unregister agent: {}", e);
            }
            match outcome {
                Ok(()) => debug!(agent_id = %agent_id, "Agent task finished"),
                Err(e) => {
                    error!(agent_id = %agent_id, "Agent task failed: {}", e);
                    if let Some(parent) = parent {
                        let _ = parent.notify_spawn_failed(agent_id, format!("agent crashed: {}", e));
                    }
                }
            }
        });
    }

    pub fn lookup(&self, agent_id: &AgentId) -> Result<Option<AgentHandle>, AgentError> {
        Ok(self.inner.registry.lookup(agent_id)?)
    }

    /// Shut down every registered agent, waiting for each.
    pub async fn shutdown_all(&self) {
        let handles = match self.inner.registry.handles() {
            Ok(handles) => handles,
            Err(e) => {
                warn!("Could not list agents for shutdown: {}", e);
                return;
            }
        };
        for handle in handles {
            if let Err(e) = handle.shutdown().await {
                debug!(agent_id = %handle.id(), "Shutdown skipped: {}", e);
            }
        }
    }
}
