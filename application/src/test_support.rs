//! Hand-written fakes for the ports, shared by the unit tests.

use crate::agent::{AgentHandle, AgentRuntime, AgentServices, AgentSnapshot, Collaborators};
use crate::config::RuntimeConfig;
use crate::ports::action_executor::{
    ActionError, ActionExecutor, ActionRequest, CommandHandle, CommandStatus, Execution,
};
use crate::ports::embedding::{Embedder, Embedding, EmbeddingError};
use crate::ports::llm_gateway::{
    GatewayError, LlmGateway, ModelResponse, QueryOptions, QueryOutcome, Usage,
};
use crate::ports::persistence::{CostSink, PersistenceError, SpendSource, StateStore};
use crate::ports::reflection::{NoReflection, Reflection, ReflectionError, ReflectionOptions, Reflector};
use crate::services::{Condenser, LessonManager, PerModelQueryEngine};
use async_trait::async_trait;
use conclave_domain::{
    ActionCatalog, AgentId, ContextMemory, CostContext, CostKind, CostRecord, HistoryEntry, Lesson,
    Message, ModelId, TokenEstimator,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

// ==================== Embedding ====================

const VOCABULARY: &[&str] = &[
    "build", "cargo", "docker", "test", "deploy", "helm", "parser", "shell", "ls", "web", "file",
];
const HASH_BUCKETS: usize = 16;

/// Embeds text as a bag of known keywords.
///
/// Words are matched by prefix ("tests" counts as "test"). Text with no
/// keyword gets a one-hot vector in a hashed bucket, so identical texts
/// still compare equal. Any text containing `FAIL` fails to embed.
pub struct KeywordEmbedder {
    cost: Option<Decimal>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self { cost: None }
    }

    pub fn with_cost(cost: Decimal) -> Self {
        Self { cost: Some(cost) }
    }

    fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; VOCABULARY.len() + HASH_BUCKETS];
        let lower = text.to_lowercase();
        let mut matched = false;
        for word in lower.split(|c: char| !c.is_alphanumeric()) {
            for (i, keyword) in VOCABULARY.iter().enumerate() {
                if word.starts_with(keyword) {
                    vector[i] = 1.0;
                    matched = true;
                }
            }
        }
        if !matched {
            let bucket = lower.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            vector[VOCABULARY.len() + bucket % HASH_BUCKETS] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(
        &self,
        text: &str,
        cost_context: Option<&CostContext>,
    ) -> Result<Embedding, EmbeddingError> {
        if text.contains("FAIL") {
            return Err(EmbeddingError::RequestFailed("scripted failure".to_string()));
        }
        let cost = match (self.cost, cost_context) {
            (Some(amount), Some(context)) => {
                Some(CostRecord::new(context.clone(), CostKind::Embedding, amount))
            }
            _ => None,
        };
        Ok(Embedding {
            vector: Self::vector(text),
            cost,
        })
    }
}

// ==================== Reflection ====================

pub struct ScriptedReflector {
    outcome: Result<(Vec<Lesson>, Vec<String>), String>,
    calls: Mutex<Vec<Vec<HistoryEntry>>>,
}

impl ScriptedReflector {
    pub fn succeeding(lessons: Vec<Lesson>, states: Vec<String>) -> Self {
        Self {
            outcome: Ok((lessons, states)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            outcome: Err("reflection unavailable".to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Entries passed to every call so far.
    pub fn calls(&self) -> Vec<Vec<HistoryEntry>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reflector for ScriptedReflector {
    async fn reflect(
        &self,
        entries: &[HistoryEntry],
        _model: &ModelId,
        _options: &ReflectionOptions,
    ) -> Result<Reflection, ReflectionError> {
        self.calls.lock().unwrap().push(entries.to_vec());
        match &self.outcome {
            Ok((lessons, state)) => Ok(Reflection {
                lessons: lessons.clone(),
                state: state.clone(),
                cost: None,
            }),
            Err(reason) => Err(ReflectionError::Failed(reason.clone())),
        }
    }
}

// ==================== LLM gateway ====================

#[derive(Debug, Clone)]
enum Scripted {
    Respond(String),
    Fail(String),
    Error(GatewayError),
}

/// One recorded gateway call
#[derive(Debug, Clone)]
pub struct GatewayCall {
    pub model: ModelId,
    pub messages: Vec<Message>,
    pub options: QueryOptions,
}

/// Gateway answering from per-model scripts.
///
/// Each model consumes its script in order; once it is exhausted the
/// default response (if any) is used, otherwise the model fails.
pub struct FakeGateway {
    scripts: Mutex<HashMap<ModelId, VecDeque<Scripted>>>,
    default: Option<String>,
    cost: Option<Decimal>,
    unavailable: BTreeSet<ModelId>,
    delay: Option<Duration>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default: None,
            cost: None,
            unavailable: BTreeSet::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script(self, model: &ModelId, step: Scripted) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.clone())
            .or_default()
            .push_back(step);
        self
    }

    pub fn with_response(self, model: &ModelId, content: &str) -> Self {
        self.script(model, Scripted::Respond(content.to_string()))
    }

    pub fn with_failure(self, model: &ModelId, reason: &str) -> Self {
        self.script(model, Scripted::Fail(reason.to_string()))
    }

    pub fn with_error(self, model: &ModelId, error: GatewayError) -> Self {
        self.script(model, Scripted::Error(error))
    }

    pub fn with_default(mut self, content: &str) -> Self {
        self.default = Some(content.to_string());
        self
    }

    /// Price every successful response at `cost`.
    pub fn with_cost(mut self, cost: Decimal) -> Self {
        self.cost = Some(cost);
        self
    }

    pub fn with_unavailable(mut self, model: &str) -> Self {
        self.unavailable.insert(ModelId::from(model));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, model: &str) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.model.as_str() == model)
            .collect()
    }
}

#[async_trait]
impl LlmGateway for FakeGateway {
    async fn query(
        &self,
        messages: &[Message],
        models: &[ModelId],
        options: &QueryOptions,
    ) -> Result<QueryOutcome, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut outcome = QueryOutcome::default();
        for model in models {
            self.calls.lock().unwrap().push(GatewayCall {
                model: model.clone(),
                messages: messages.to_vec(),
                options: options.clone(),
            });
            let step = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(model)
                .and_then(VecDeque::pop_front);
            let step = match (step, &self.default) {
                (Some(step), _) => step,
                (None, Some(content)) => Scripted::Respond(content.clone()),
                (None, None) => Scripted::Fail("script exhausted".to_string()),
            };
            match step {
                Scripted::Respond(content) => {
                    let mut response = ModelResponse::new(model.clone(), content);
                    if let Some(cost) = self.cost {
                        response.usage = Some(Usage {
                            input_tokens: 10,
                            output_tokens: 5,
                            cost,
                        });
                    }
                    outcome.successful.push(response);
                }
                Scripted::Fail(reason) => outcome.failed.push((model.clone(), reason)),
                Scripted::Error(error) => return Err(error),
            }
        }
        Ok(outcome)
    }

    fn is_available(&self, model: &ModelId) -> bool {
        !self.unavailable.contains(model)
    }
}

/// Query engine over `gateway` with keyword embeddings and no reflection.
pub fn engine_with(
    gateway: Arc<FakeGateway>,
    configure: impl FnOnce(RuntimeConfig) -> RuntimeConfig,
) -> PerModelQueryEngine {
    let config = configure(RuntimeConfig::default());
    let lessons = LessonManager::new(Arc::new(KeywordEmbedder::new()), config.lessons.clone());
    let condenser = Condenser::new(
        Arc::new(NoReflection),
        lessons,
        TokenEstimator::shared().unwrap(),
        config.condensation.clone(),
    );
    PerModelQueryEngine::new(
        gateway,
        condenser,
        ActionCatalog::default(),
        config.temperature.clone(),
        config.context_limits.clone(),
        config.consensus.max_rounds,
    )
}

// ==================== Actions ====================

/// Executor recording every request.
///
/// `execute_shell` with a `command` param starts a background command whose
/// status is driven by the test through [`FakeExecutor::finish`]; anything
/// else completes immediately with `{"ok": true}` unless the action is
/// listed as failing.
pub struct FakeExecutor {
    requests: Mutex<Vec<ActionRequest>>,
    commands: Mutex<BTreeMap<String, watch::Sender<CommandStatus>>>,
    failing: BTreeSet<String>,
    panicking: BTreeSet<String>,
    hanging: BTreeSet<String>,
    next_id: Mutex<u32>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            commands: Mutex::new(BTreeMap::new()),
            failing: BTreeSet::new(),
            panicking: BTreeSet::new(),
            hanging: BTreeSet::new(),
            next_id: Mutex::new(0),
        }
    }

    pub fn failing_on(mut self, action: &str) -> Self {
        self.failing.insert(action.to_string());
        self
    }

    /// The executor task panics on `action`, so its router dies silently.
    pub fn panicking_on(mut self, action: &str) -> Self {
        self.panicking.insert(action.to_string());
        self
    }

    /// `action` never completes.
    pub fn hanging_on(mut self, action: &str) -> Self {
        self.hanging.insert(action.to_string());
        self
    }

    pub fn requests(&self) -> Vec<ActionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Mark a started command as exited.
    pub fn finish(&self, correlation_id: &str, output: &str) {
        if let Some(tx) = self.commands.lock().unwrap().get(correlation_id) {
            let _ = tx.send(CommandStatus::Exited {
                code: Some(0),
                output: output.to_string(),
            });
        }
    }
}

#[async_trait]
impl ActionExecutor for FakeExecutor {
    fn supports(&self, _action: &str) -> bool {
        true
    }

    async fn execute(&self, request: &ActionRequest) -> Result<Execution, ActionError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.action) {
            return Err(ActionError::Failed(format!("{} failed", request.action)));
        }
        if self.panicking.contains(&request.action) {
            panic!("executor crashed on {}", request.action);
        }
        if self.hanging.contains(&request.action) {
            std::future::pending::<()>().await;
        }
        if request.action == conclave_domain::action::catalog::EXECUTE_SHELL
            && request.params.get("command").is_some()
        {
            let correlation_id = {
                let mut next = self.next_id.lock().unwrap();
                *next += 1;
                format!("cid-{}", *next)
            };
            let (tx, rx) = watch::channel(CommandStatus::Running {
                output: String::new(),
            });
            let cancel = CancellationToken::new();
            let on_cancel = cancel.clone();
            let status = tx.clone();
            tokio::spawn(async move {
                on_cancel.cancelled().await;
                let _ = status.send(CommandStatus::Terminated {
                    output: String::new(),
                });
            });
            self.commands
                .lock()
                .unwrap()
                .insert(correlation_id.clone(), tx);
            return Ok(Execution::Started {
                result: json!({"command_id": correlation_id, "status": "running"}),
                correlation_id,
                command: CommandHandle { status: rx, cancel },
            });
        }
        Ok(Execution::Completed(json!({"ok": true})))
    }
}

// ==================== Persistence ====================

/// Spend source with a settable total; `None` simulates an outage.
pub struct FakeSpend {
    committed: Mutex<Option<Decimal>>,
    /// One-shot readings served before `committed`, each after its delay
    readings: Mutex<VecDeque<(Duration, Decimal)>>,
}

impl FakeSpend {
    pub fn new(committed: Decimal) -> Self {
        Self {
            committed: Mutex::new(Some(committed)),
            readings: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_reading(self, delay: Duration, committed: Decimal) -> Self {
        self.readings.lock().unwrap().push_back((delay, committed));
        self
    }

    pub fn set(&self, committed: Option<Decimal>) {
        *self.committed.lock().unwrap() = committed;
    }
}

#[async_trait]
impl SpendSource for FakeSpend {
    async fn committed(&self, _agent_id: &AgentId) -> Result<Decimal, PersistenceError> {
        let reading = self.readings.lock().unwrap().pop_front();
        if let Some((delay, committed)) = reading {
            tokio::time::sleep(delay).await;
            return Ok(committed);
        }
        (*self.committed.lock().unwrap())
            .ok_or_else(|| PersistenceError::Unavailable("spend source down".to_string()))
    }
}

/// Cost sink keeping every flushed batch.
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<CostRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<Vec<CostRecord>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl CostSink for RecordingSink {
    async fn flush(&self, records: Vec<CostRecord>) -> Result<(), PersistenceError> {
        self.batches.lock().unwrap().push(records);
        Ok(())
    }
}

/// In-memory state store.
pub struct MemoryStore {
    saved: Mutex<BTreeMap<AgentId, ContextMemory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            saved: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_saved(self, agent_id: &AgentId, memory: ContextMemory) -> Self {
        self.saved.lock().unwrap().insert(agent_id.clone(), memory);
        self
    }

    pub fn saved(&self, agent_id: &AgentId) -> Option<ContextMemory> {
        self.saved.lock().unwrap().get(agent_id).cloned()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn persist(&self, agent_id: &AgentId, memory: &ContextMemory) -> Result<(), PersistenceError> {
        self.saved
            .lock()
            .unwrap()
            .insert(agent_id.clone(), memory.clone());
        Ok(())
    }

    async fn restore(&self, agent_id: &AgentId) -> Result<ContextMemory, PersistenceError> {
        Ok(self.saved(agent_id).unwrap_or_default())
    }
}

/// A proposal in the JSON shape models answer with.
pub fn proposal_json(action: &str, params: Value) -> String {
    json!({"action": action, "params": params, "reasoning": format!("do {}", action)}).to_string()
}

/// A proposal carrying a `wait` value.
pub fn waiting_json(action: &str, params: Value, wait: Value) -> String {
    json!({"action": action, "params": params, "wait": wait, "reasoning": format!("do {}", action)}).to_string()
}

/// A proposal that leaves the agent idle until the next event.
pub fn idle_json() -> String {
    waiting_json("wait", json!({}), json!(true))
}

// ==================== Runtime ====================

pub fn collaborators(gateway: Arc<FakeGateway>) -> Collaborators {
    Collaborators::new(gateway, Arc::new(KeywordEmbedder::new()))
}

pub fn runtime_with(
    collaborators: Collaborators,
    configure: impl FnOnce(RuntimeConfig) -> RuntimeConfig,
) -> AgentRuntime {
    let services = AgentServices::new(configure(RuntimeConfig::default()), collaborators).unwrap();
    AgentRuntime::new(services)
}

/// Poll snapshots until `done` holds; panics after five seconds.
pub async fn wait_for(handle: &AgentHandle, done: impl Fn(&AgentSnapshot) -> bool) -> AgentSnapshot {
    let poll = async {
        loop {
            let snapshot = handle.snapshot().await.unwrap();
            if done(&snapshot) {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), poll)
        .await
        .expect("agent did not settle")
}

pub async fn settle(handle: &AgentHandle) -> AgentSnapshot {
    wait_for(handle, AgentSnapshot::is_idle).await
}
