//! Event batching
//!
//! Decides, for every event an agent receives, whether it is appended now,
//! held in the FIFO queue, or whether a consensus cycle is owed. The actor
//! performs the effects (appending, emitting triggers, starting cycles);
//! this type only tracks the obligations.
//!
//! | Event | Condition | Outcome |
//! |---|---|---|
//! | result, continue | always | schedule, emit trigger |
//! | result, no continue | queue non-empty and agent otherwise idle | schedule, emit trigger |
//! | result, no continue | otherwise | nothing |
//! | external event | idle | append now, schedule, emit trigger |
//! | external event | busy | queue |
//! | trigger / current timer | scheduled or timer armed, no job | run: flush queue, start cycle |
//! | trigger / current timer | job running | deferred until the job ends |
//! | trigger / any timer | nothing owed | stale |
//! | spawn failure | always | schedule, emit trigger |
//!
//! "Busy" means a dispatched action is pending, a cycle is scheduled, or a
//! background job (consensus cycle or pool switch) is running.

use super::messages::QueuedMessage;
use std::collections::VecDeque;

/// Whether the actor must emit a trigger signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Step {
    Nothing,
    EmitTrigger,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Append now; a trigger must be emitted
    Immediate(QueuedMessage),
    Queued,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// Nothing was owed
    Stale,
    /// A job is running; the obligation stays and is re-emitted after it
    Deferred,
    /// Start a cycle after appending `flushed`, in order
    Run {
        flushed: Vec<QueuedMessage>,
        cancelled_timer: bool,
    },
}

#[derive(Debug, Default)]
pub struct EventBatcher {
    scheduled: bool,
    timer: Option<u64>,
    next_generation: u64,
    job_running: bool,
    queue: VecDeque<QueuedMessage>,
}

impl EventBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self, pending: usize) -> bool {
        pending > 0 || self.scheduled || self.job_running
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_some()
    }

    pub fn job_running(&self) -> bool {
        self.job_running
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn admit(&mut self, message: QueuedMessage, pending: usize) -> Admission {
        if self.is_busy(pending) {
            self.queue.push_back(message);
            Admission::Queued
        } else {
            self.scheduled = true;
            Admission::Immediate(message)
        }
    }

    /// An action result was appended; `pending` no longer counts it.
    pub fn on_result(&mut self, continues: bool, pending: usize) -> Step {
        if continues {
            self.scheduled = true;
            return Step::EmitTrigger;
        }
        self.flush_if_idle(pending)
    }

    pub fn on_spawn_failure(&mut self) -> Step {
        self.scheduled = true;
        Step::EmitTrigger
    }

    pub fn on_trigger(&mut self) -> TriggerOutcome {
        if !self.scheduled && self.timer.is_none() {
            return TriggerOutcome::Stale;
        }
        if self.job_running {
            self.scheduled = true;
            return TriggerOutcome::Deferred;
        }
        self.scheduled = false;
        let cancelled_timer = self.timer.take().is_some();
        self.job_running = true;
        TriggerOutcome::Run {
            flushed: self.queue.drain(..).collect(),
            cancelled_timer,
        }
    }

    /// A wait timer fired; timers other than the current one are stale.
    pub fn on_timer(&mut self, generation: u64) -> TriggerOutcome {
        if self.timer != Some(generation) {
            return TriggerOutcome::Stale;
        }
        self.on_trigger()
    }

    /// Arm a new timer, superseding any outstanding one.
    pub fn arm_timer(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.timer = Some(generation);
        generation
    }

    pub fn disarm_timer(&mut self) -> bool {
        self.timer.take().is_some()
    }

    /// Mark a job as running outside the trigger path (pool switches).
    pub fn start_job(&mut self) {
        self.job_running = true;
    }

    pub fn finish_job(&mut self, pending: usize) -> Step {
        self.job_running = false;
        if self.scheduled {
            return Step::EmitTrigger;
        }
        self.flush_if_idle(pending)
    }

    // Queued events must not wait behind a later immediate one
    fn flush_if_idle(&mut self, pending: usize) -> Step {
        if !self.queue.is_empty() && !self.is_busy(pending) {
            self.scheduled = true;
            return Step::EmitTrigger;
        }
        Step::Nothing
    }
}
