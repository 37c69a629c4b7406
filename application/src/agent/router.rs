//! Action routers
//!
//! Every externally executed action runs in its own router task so the
//! agent loop never waits on an executor. A router reports back through the
//! agent's mailbox:
//!
//! | Outcome | Messages sent |
//! |---------|---------------|
//! | action completed | `ActionResult` |
//! | background command started | `CommandRegistered`, then `ActionResult` |
//! | command reached a final state | `CommandFinished` |
//! | router exits (any reason) | `RouterDown` |
//!
//! A router that started background commands keeps them in its command
//! table and answers status checks and termination requests for them. It
//! lingers for the configured retention after its last command finished,
//! then exits. `RouterDown` is sent from a drop guard, so it also arrives
//! when the task is aborted or panics.

use super::messages::AgentMessage;
use crate::ports::action_executor::{
    ActionError, ActionExecutor, ActionRequest, CommandHandle, CommandStatus, Execution,
};
use conclave_domain::ActionId;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Identity of one router task, stable for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonitorRef(u64);

impl MonitorRef {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MonitorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "router-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterCommand {
    Execute(ActionRequest),
    CheckStatus {
        action_id: ActionId,
        correlation_id: String,
    },
    Terminate {
        action_id: ActionId,
        correlation_id: String,
    },
}

impl RouterCommand {
    /// Follow-up request carried by `request`, if any.
    ///
    /// `check_id` asks for a command's status, `terminate_id` stops it.
    pub fn follow_up(request: &ActionRequest) -> Option<RouterCommand> {
        let param = |name: &str| request.params.get(name).and_then(Value::as_str).map(str::to_string);
        if let Some(correlation_id) = param("terminate_id") {
            return Some(RouterCommand::Terminate {
                action_id: request.action_id.clone(),
                correlation_id,
            });
        }
        param("check_id").map(|correlation_id| RouterCommand::CheckStatus {
            action_id: request.action_id.clone(),
            correlation_id,
        })
    }

    pub fn action_id(&self) -> &ActionId {
        match self {
            RouterCommand::Execute(request) => &request.action_id,
            RouterCommand::CheckStatus { action_id, .. } | RouterCommand::Terminate { action_id, .. } => action_id,
        }
    }
}

/// What a router needs from its agent
#[derive(Clone)]
pub struct RouterContext {
    pub executor: Arc<dyn ActionExecutor>,
    pub agent: mpsc::UnboundedSender<AgentMessage>,
    /// How long finished commands stay queryable
    pub retention: Duration,
    /// How long a termination request waits for the command to stop
    pub terminate_timeout: Duration,
}

/// Owning handle to a router task
#[derive(Debug)]
pub struct RouterHandle {
    pub monitor: MonitorRef,
    commands: mpsc::UnboundedSender<RouterCommand>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl RouterHandle {
    /// Hand a command to the router; gives it back if the router is gone.
    pub fn send(&self, command: RouterCommand) -> Result<(), RouterCommand> {
        self.commands.send(command).map_err(|e| e.0)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Cancel the router and wait up to `timeout` for it to stop, aborting
    /// it afterwards.
    pub async fn stop(self, timeout: Duration) {
        self.cancel.cancel();
        let abort = self.join.abort_handle();
        if tokio::time::timeout(timeout, self.join).await.is_err() {
            warn!(monitor = %self.monitor, "Router did not stop in time, aborting");
            abort.abort();
        }
    }
}

/// Spawn a router and hand it its first command.
pub fn spawn_router(monitor: MonitorRef, context: RouterContext, first: RouterCommand) -> RouterHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let router = Router {
        monitor,
        context,
        commands: HashMap::new(),
        watchers: JoinSet::new(),
    };
    let join = tokio::spawn(router.run(rx, cancel.clone(), first));
    RouterHandle {
        monitor,
        commands: tx,
        cancel,
        join,
    }
}

/// Sends `RouterDown` when the router task ends, however it ends.
struct MonitorGuard {
    monitor: MonitorRef,
    agent: mpsc::UnboundedSender<AgentMessage>,
}

impl Drop for MonitorGuard {
    fn drop(&mut self) {
        let _ = self.agent.send(AgentMessage::RouterDown { monitor: self.monitor });
    }
}

struct Router {
    monitor: MonitorRef,
    context: RouterContext,
    commands: HashMap<String, CommandHandle>,
    watchers: JoinSet<(String, CommandStatus)>,
}

impl Router {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<RouterCommand>,
        cancel: CancellationToken,
        first: RouterCommand,
    ) {
        let _guard = MonitorGuard {
            monitor: self.monitor,
            agent: self.context.agent.clone(),
        };
        debug!(monitor = %self.monitor, "Router started");

        tokio::select! {
            _ = self.handle(first) => {}
            _ = cancel.cancelled() => {}
        }

        while !cancel.is_cancelled() {
            let idle = self.watchers.is_empty();
            let linger = if self.commands.is_empty() {
                Duration::ZERO
            } else {
                self.context.retention
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                Some(command) = rx.recv() => {
                    tokio::select! {
                        _ = self.handle(command) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
                Some(joined) = self.watchers.join_next(), if !idle => {
                    if let Ok((correlation_id, status)) = joined {
                        debug!(monitor = %self.monitor, correlation_id = %correlation_id, "Command finished");
                        self.report(AgentMessage::CommandFinished { correlation_id, status });
                    }
                }
                _ = tokio::time::sleep(linger), if idle => break,
            }
        }

        if cancel.is_cancelled() {
            for command in self.commands.values() {
                command.cancel.cancel();
            }
        }

        // commands that arrived after the loop ended still get an answer
        rx.close();
        while let Ok(command) = rx.try_recv() {
            self.decline(command);
        }
        debug!(monitor = %self.monitor, "Router stopped");
    }

    fn decline(&self, command: RouterCommand) {
        let (action_id, error) = match command {
            RouterCommand::Execute(request) => (request.action_id, ActionError::Cancelled),
            RouterCommand::CheckStatus {
                action_id,
                correlation_id,
            }
            | RouterCommand::Terminate {
                action_id,
                correlation_id,
            } => (action_id, ActionError::CommandNotFound(correlation_id)),
        };
        self.report(AgentMessage::ActionResult {
            action_id,
            result: Err(error),
        });
    }

    async fn handle(&mut self, command: RouterCommand) {
        match command {
            RouterCommand::Execute(request) => self.execute(request).await,
            RouterCommand::CheckStatus {
                action_id,
                correlation_id,
            } => {
                let result = match self.commands.get(&correlation_id) {
                    Some(command) => Ok(command.current().to_json(&correlation_id)),
                    None => Err(ActionError::CommandNotFound(correlation_id)),
                };
                self.report(AgentMessage::ActionResult { action_id, result });
            }
            RouterCommand::Terminate {
                action_id,
                correlation_id,
            } => {
                let result = match self.commands.get(&correlation_id) {
                    Some(command) => {
                        command.cancel.cancel();
                        let finished = command.clone().finished();
                        let status = match tokio::time::timeout(self.context.terminate_timeout, finished).await {
                            Ok(status) => status,
                            Err(_) => command.current(),
                        };
                        Ok(status.to_json(&correlation_id))
                    }
                    None => Err(ActionError::CommandNotFound(correlation_id)),
                };
                self.report(AgentMessage::ActionResult { action_id, result });
            }
        }
    }

    async fn execute(&mut self, request: ActionRequest) {
        let action_id = request.action_id.clone();
        let result = match self.context.executor.execute(&request).await {
            Ok(Execution::Completed(value)) => Ok(value),
            Ok(Execution::Started {
                correlation_id,
                command,
                result,
            }) => {
                self.register_command(correlation_id, command);
                Ok(result)
            }
            Err(e) => {
                debug!(action_id = %action_id, "Action failed: {}", e);
                Err(e)
            }
        };
        self.report(AgentMessage::ActionResult { action_id, result });
    }

    fn register_command(&mut self, correlation_id: String, command: CommandHandle) {
        self.report(AgentMessage::CommandRegistered {
            monitor: self.monitor,
            correlation_id: correlation_id.clone(),
        });
        let watched = command.clone();
        let id = correlation_id.clone();
        self.watchers.spawn(async move { (id, watched.finished().await) });
        self.commands.insert(correlation_id, command);
    }

    fn report(&self, message: AgentMessage) {
        // the agent is gone; nothing left to report to
        let _ = self.context.agent.send(message);
    }
}
