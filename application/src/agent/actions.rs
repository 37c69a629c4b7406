//! Decision dispatch and the built-in actions
//!
//! Actions the catalog declares synchronous (`orient`, `todo`, `wait`,
//! `send_message`, `spawn_child`, `dismiss_child`) run inside the actor;
//! asynchronous ones go to a router.
//! Either way the result arrives as an ordinary `ActionResult` message, so
//! the batching rules treat both paths alike.

use super::actor::{AgentActor, ChildEntry};
use super::messages::AgentMessage;
use super::router::RouterContext;
use super::runtime::AgentSpec;
use crate::ports::action_executor::{ActionError, ActionRequest};
use conclave_domain::action::catalog::{DISMISS_CHILD, ORIENT, SEND_MESSAGE, SPAWN_CHILD, TODO, WAIT};
use conclave_domain::{
    ActionId, AgentId, BudgetState, CapabilityGroup, Decision, HistoryEntry, ModelId,
    PendingAction, TodoItem, normalize_wait,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::str::FromStr;
use tracing::{debug, info, warn};

fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, ActionError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ActionError::InvalidParams(format!("missing string parameter '{}'", name)))
}

fn decimal_param(params: &Value, name: &str) -> Result<Option<Decimal>, ActionError> {
    let invalid = || ActionError::InvalidParams(format!("'{}' must be a decimal amount", name));
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).map(Some).map_err(|_| invalid()),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

impl AgentActor {
    pub(super) fn dispatch_decision(&mut self, decision: Decision) {
        let Decision {
            kind,
            proposal,
            supporters,
            round,
        } = decision;
        let traits = self.services().catalog.traits(&proposal.action);
        let wait = normalize_wait(proposal.wait.as_ref(), traits.self_contained);
        if let Some(raw) = &wait.invalid {
            warn!(agent_id = %self.agent_id, raw = %raw, "Unrecognised wait value, waiting for an event");
        }

        self.memory.push_all(HistoryEntry::decision(
            &proposal.action,
            &proposal.params,
            &proposal.reasoning,
        ));
        self.broadcast(
            "decision",
            json!({
                "action": proposal.action,
                "params": proposal.params,
                "kind": kind,
                "round": round,
                "supporters": supporters,
            }),
        );

        let action_id = ActionId::generate();
        let pending = PendingAction::new(
            action_id.clone(),
            proposal.action.clone(),
            proposal.params.clone(),
            wait.policy,
            traits,
        );
        if let Err(e) = self.dispatch.track(pending) {
            self.record_cycle_failure(&e.to_string());
            return;
        }

        let request = ActionRequest {
            action_id,
            action: proposal.action,
            params: proposal.params,
            agent_id: self.agent_id.clone(),
            task_id: self.task_id.clone(),
        };

        if !CapabilityGroup::allows(&self.capabilities, &request.action) {
            self.deliver(request.action_id, Err(ActionError::NotPermitted(request.action)));
            return;
        }
        if traits.is_synchronous() {
            let result = self.run_builtin(&request);
            self.deliver(request.action_id, result);
            return;
        }
        if !self.services().executor.supports(&request.action) {
            self.deliver(request.action_id, Err(ActionError::Unsupported(request.action)));
            return;
        }

        let context = RouterContext {
            executor: self.services().executor.clone(),
            agent: self.mailbox.sender(),
            retention: self.services().config.command_retention,
            terminate_timeout: self.services().config.router_shutdown_timeout,
        };
        let monitor = self.dispatch.dispatch(request, traits.follow_up, &context);
        debug!(agent_id = %self.agent_id, monitor = %monitor, "Action handed to router");
    }

    fn deliver(&mut self, action_id: ActionId, result: Result<Value, ActionError>) {
        self.mailbox.push(AgentMessage::ActionResult { action_id, result });
    }

    fn run_builtin(&mut self, request: &ActionRequest) -> Result<Value, ActionError> {
        match request.action.as_str() {
            ORIENT => Ok(self.orientation()),
            TODO => self.update_todos(&request.params),
            WAIT => Ok(json!({"waiting": true})),
            SEND_MESSAGE => self.send_message(&request.params),
            SPAWN_CHILD => self.spawn_child(&request.params),
            DISMISS_CHILD => self.dismiss_child(&request.params),
            other => Err(ActionError::Unsupported(other.to_string())),
        }
    }

    fn orientation(&self) -> Value {
        let children: Vec<Value> = self
            .children
            .iter()
            .map(|(id, child)| json!({"agent_id": id, "task": child.task}))
            .collect();
        json!({
            "agent_id": self.agent_id,
            "task": self.task,
            "pool": self.memory.pool,
            "pending_actions": self.dispatch.pending_len(),
            "queued_messages": self.batcher.queued(),
            "children": children,
            "todos": self.todos,
            "budget": self.budget,
        })
    }

    /// `add` (string or list), `complete` (index or exact text), `clear`.
    fn update_todos(&mut self, params: &Value) -> Result<Value, ActionError> {
        let mut touched = false;

        if params.get("clear").and_then(Value::as_bool) == Some(true) {
            self.todos.clear();
            touched = true;
        }
        match params.get("add") {
            Some(Value::String(item)) => {
                self.todos.push(TodoItem::new(item.clone()));
                touched = true;
            }
            Some(Value::Array(items)) => {
                for item in items {
                    let item = item
                        .as_str()
                        .ok_or_else(|| ActionError::InvalidParams("todo items must be strings".to_string()))?;
                    self.todos.push(TodoItem::new(item));
                }
                touched = true;
            }
            Some(_) => return Err(ActionError::InvalidParams("'add' must be a string or a list".to_string())),
            None => {}
        }
        if let Some(target) = params.get("complete") {
            let index = match target {
                Value::Number(n) => n.as_u64().map(|i| i as usize).filter(|i| *i < self.todos.len()),
                Value::String(text) => self.todos.iter().position(|t| &t.content == text),
                _ => None,
            };
            let index = index.ok_or_else(|| ActionError::InvalidParams(format!("no todo item {}", target)))?;
            self.todos[index].done = true;
            touched = true;
        }

        if !touched {
            return Err(ActionError::InvalidParams(
                "expected one of 'add', 'complete' or 'clear'".to_string(),
            ));
        }
        Ok(json!({"todos": self.todos}))
    }

    fn send_message(&mut self, params: &Value) -> Result<Value, ActionError> {
        let to = str_param(params, "to")?;
        let content = str_param(params, "content")?;
        let sender = self.agent_id.to_string();

        match to {
            "user" => {
                self.broadcast("user_message", json!({"content": content}));
            }
            "parent" => {
                let parent = self
                    .parent
                    .as_ref()
                    .ok_or_else(|| ActionError::InvalidParams("agent has no parent".to_string()))?;
                parent
                    .send_message(sender, content)
                    .map_err(|e| ActionError::Failed(e.to_string()))?;
            }
            child => {
                let entry = self
                    .children
                    .get(&AgentId::from(child))
                    .ok_or_else(|| ActionError::InvalidParams(format!("unknown recipient '{}'", child)))?;
                entry
                    .handle
                    .send_message("parent", content)
                    .map_err(|e| ActionError::Failed(e.to_string()))?;
            }
        }
        Ok(json!({"delivered_to": to}))
    }

    /// `task` (required), `models`, `budget`, `capabilities`. The child
    /// gets at most this agent's capabilities.
    fn spawn_child(&mut self, params: &Value) -> Result<Value, ActionError> {
        let task = str_param(params, "task")?.to_string();

        let pool = match params.get("models") {
            None | Some(Value::Null) => self.memory.pool.clone(),
            Some(models) => serde_json::from_value::<Vec<String>>(models.clone())
                .map_err(|_| ActionError::InvalidParams("'models' must be a list of model ids".to_string()))?
                .into_iter()
                .map(ModelId::from)
                .collect(),
        };
        let budget = match decimal_param(params, "budget")? {
            Some(amount) => BudgetState::allocated(amount),
            None => BudgetState::na(),
        };
        let capabilities = match params.get("capabilities") {
            None | Some(Value::Null) => self.capabilities.clone(),
            Some(groups) => serde_json::from_value::<BTreeSet<CapabilityGroup>>(groups.clone())
                .map_err(|e| ActionError::InvalidParams(format!("invalid capabilities: {}", e)))?
                .intersection(&self.capabilities)
                .copied()
                .collect(),
        };

        let spec = AgentSpec::new(task.clone(), pool)
            .with_parent(self.me.clone())
            .with_budget(budget)
            .with_capabilities(capabilities)
            .with_message(task.clone());
        let child_id = spec.agent_id.clone();

        // the failed result is the only report; no spawn-failure notice
        let handle = self
            .runtime
            .start(spec)
            .map_err(|e| ActionError::Failed(e.to_string()))?;
        info!(agent_id = %self.agent_id, child = %child_id, "Spawned child agent");
        self.broadcast("child_spawned", json!({"child": child_id, "task": task}));
        self.children.insert(child_id.clone(), ChildEntry { handle, task });
        Ok(json!({"agent_id": child_id}))
    }

    fn dismiss_child(&mut self, params: &Value) -> Result<Value, ActionError> {
        let child_id = AgentId::from(str_param(params, "agent_id")?);
        let child = self
            .children
            .remove(&child_id)
            .ok_or_else(|| ActionError::InvalidParams(format!("unknown child '{}'", child_id)))?;
        if child.handle.request_shutdown().is_err() {
            debug!(agent_id = %self.agent_id, child = %child_id, "Child had already stopped");
        }
        info!(agent_id = %self.agent_id, child = %child_id, "Dismissed child agent");
        Ok(json!({"dismissed": child_id}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_param() {
        let params = json!({"a": 2.5, "b": "10.00", "c": true});
        assert_eq!(decimal_param(&params, "a").unwrap(), Some(Decimal::new(25, 1)));
        assert_eq!(decimal_param(&params, "b").unwrap(), Some(Decimal::new(1000, 2)));
        assert_eq!(decimal_param(&params, "missing").unwrap(), None);
        assert!(decimal_param(&params, "c").is_err());
    }

    #[test]
    fn test_missing_string_param() {
        let err = str_param(&json!({}), "task").unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }
}
