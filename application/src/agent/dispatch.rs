//! Action dispatch bookkeeping
//!
//! Tracks in-flight actions, the routers executing them, and which router
//! owns each background command. Follow-up requests for a known command
//! always go to the router that started it; only an unknown correlation id
//! gets a fresh router, which then answers `command_not_found`.

use super::router::{MonitorRef, RouterCommand, RouterContext, RouterHandle, spawn_router};
use crate::ports::action_executor::ActionRequest;
use conclave_domain::{ActionId, DomainError, PendingAction, PendingActions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
pub struct DispatchTracker {
    pending: PendingActions,
    active_routers: HashMap<MonitorRef, RouterHandle>,
    /// correlation id → owning router; every value is a key of `active_routers`
    shell_routers: HashMap<String, MonitorRef>,
    /// action id → router that owes its result
    routed: HashMap<ActionId, MonitorRef>,
    next_monitor: u64,
}

impl DispatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, action: PendingAction) -> Result<(), DomainError> {
        self.pending.insert(action)
    }

    pub fn complete(&mut self, action_id: &ActionId) -> Option<PendingAction> {
        self.routed.remove(action_id);
        self.pending.remove(action_id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn active_routers(&self) -> usize {
        self.active_routers.len()
    }

    pub fn router_for(&self, correlation_id: &str) -> Option<MonitorRef> {
        self.shell_routers.get(correlation_id).copied()
    }

    /// Hand `request` to a router.
    ///
    /// With `follow_up` set, `check_id` / `terminate_id` params are routed to
    /// the router owning that command when it is still alive.
    pub fn dispatch(&mut self, request: ActionRequest, follow_up: bool, context: &RouterContext) -> MonitorRef {
        let action_id = request.action_id.clone();
        let command = match follow_up.then(|| RouterCommand::follow_up(&request)).flatten() {
            Some(command) => match self.route_follow_up(command) {
                Ok(monitor) => {
                    self.routed.insert(action_id, monitor);
                    return monitor;
                }
                Err(command) => command,
            },
            None => RouterCommand::Execute(request),
        };

        self.next_monitor += 1;
        let monitor = MonitorRef::new(self.next_monitor);
        debug!(monitor = %monitor, action_id = %command.action_id(), "Spawning router");
        let handle = spawn_router(monitor, context.clone(), command);
        self.active_routers.insert(monitor, handle);
        self.routed.insert(action_id, monitor);
        monitor
    }

    fn route_follow_up(&self, command: RouterCommand) -> Result<MonitorRef, RouterCommand> {
        let correlation_id = match &command {
            RouterCommand::CheckStatus { correlation_id, .. } | RouterCommand::Terminate { correlation_id, .. } => {
                correlation_id
            }
            RouterCommand::Execute(_) => return Err(command),
        };
        let Some(monitor) = self.router_for(correlation_id) else {
            return Err(command);
        };
        let Some(router) = self.active_routers.get(&monitor) else {
            return Err(command);
        };
        router.send(command).map(|()| monitor)
    }

    /// Record that `monitor` owns `correlation_id`. Ignored when the router
    /// is already gone.
    pub fn register_command(&mut self, monitor: MonitorRef, correlation_id: String) -> bool {
        if !self.active_routers.contains_key(&monitor) {
            debug!(monitor = %monitor, correlation_id = %correlation_id, "Command registered by a dead router");
            return false;
        }
        self.shell_routers.insert(correlation_id, monitor);
        true
    }

    /// Forget a router and every command it owned.
    ///
    /// Returns the still-pending actions the router never answered; the
    /// caller must complete them or the agent would wait on them forever.
    pub fn router_down(&mut self, monitor: MonitorRef) -> Vec<ActionId> {
        if self.active_routers.remove(&monitor).is_some() {
            debug!(monitor = %monitor, "Router down");
        }
        self.shell_routers.retain(|_, owner| *owner != monitor);

        let mut orphaned: Vec<ActionId> = self
            .routed
            .iter()
            .filter(|(_, owner)| **owner == monitor)
            .map(|(action_id, _)| action_id.clone())
            .collect();
        for action_id in &orphaned {
            self.routed.remove(action_id);
        }
        orphaned.retain(|action_id| self.pending.get(action_id).is_some());
        orphaned.sort();
        orphaned
    }

    /// Stop every router, waiting up to `timeout` for each.
    pub async fn shutdown(&mut self, timeout: Duration) {
        self.shell_routers.clear();
        self.routed.clear();
        let routers: Vec<RouterHandle> = self.active_routers.drain().map(|(_, handle)| handle).collect();
        if !routers.is_empty() {
            debug!("Stopping {} routers", routers.len());
        }
        for router in routers {
            router.stop(timeout).await;
        }
    }
}
