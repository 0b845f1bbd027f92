//! Action hooks installed by the controller.

use std::sync::Arc;

use rwo_workflow::{ActionHook, ActionResult, Context, Error as WorkflowError, StateSnapshot};
use tracing::{debug, warn};

use crate::events::{Event, EventRecorder, MessageStore, RisingWaveEvent};
use crate::manager::{RisingWaveManager, UPDATE_STATUS_ACTION};
use crate::types::{ConditionStatus, ConditionType, RisingWave};

/// Records lifecycle events once the status reached the store.
///
/// An event fires when its condition holds in the written status but did
/// not hold in the status as read.
pub struct EventHook {
    recorder: Arc<dyn EventRecorder>,
    risingwave: Arc<RisingWaveManager>,
    messages: Arc<MessageStore>,
}

impl EventHook {
    /// Create a new event hook.
    pub fn new(
        recorder: Arc<dyn EventRecorder>,
        risingwave: Arc<RisingWaveManager>,
        messages: Arc<MessageStore>,
    ) -> Self {
        Self {
            recorder,
            risingwave,
            messages,
        }
    }

    fn record(&self, event: RisingWaveEvent) {
        let reason = event.reason();
        self.recorder.record(
            &self.risingwave.risingwave().key(),
            Event {
                kind: event.kind(),
                reason: reason.to_string(),
                message: self.messages.message_for(reason),
            },
        );
    }

    fn record_condition_changes(&self) {
        let before = self.risingwave.risingwave();
        let after = self.risingwave.after_image();
        let transitions: [(RisingWaveEvent, fn(&RisingWave) -> bool); 4] = [
            (RisingWaveEvent::Initializing, |rw| {
                rw.is_condition(ConditionType::Initializing, ConditionStatus::True)
            }),
            (RisingWaveEvent::Running, |rw| {
                rw.is_condition(ConditionType::Running, ConditionStatus::True)
            }),
            (RisingWaveEvent::Recovering, |rw| {
                rw.condition(ConditionType::Initializing).is_none()
                    && rw.is_condition(ConditionType::Running, ConditionStatus::False)
            }),
            (RisingWaveEvent::Upgrading, |rw| {
                rw.is_condition(ConditionType::Upgrading, ConditionStatus::True)
            }),
        ];

        for (event, holds) in transitions {
            if holds(&after) && !holds(before) {
                self.record(event);
            }
        }
    }

    fn record_warnings(&self) {
        let event = RisingWaveEvent::Unhealthy;
        if self.messages.is_message_set(event.reason()) {
            self.record(event);
        }
    }
}

impl ActionHook for EventHook {
    fn pre_run(&self, _ctx: &Context, _action: &str, _states: &StateSnapshot) {}

    fn post_run(&self, _ctx: &Context, action: &str, result: &ActionResult) {
        // A conflict comes back as a requeue, and nothing was written.
        if action != UPDATE_STATUS_ACTION || result.needs_requeue() {
            return;
        }
        self.record_condition_changes();
        self.record_warnings();
    }
}

/// Logs every action run under the context span.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHook;

impl ActionHook for TracingHook {
    fn pre_run(&self, ctx: &Context, action: &str, states: &StateSnapshot) {
        debug!(parent: ctx.span(), action, states = states.len(), "Running action");
    }

    fn post_run(&self, ctx: &Context, action: &str, result: &ActionResult) {
        match &result.error {
            Some(err) if !err.is_exit() => {
                for cause in err.clone().into_errors() {
                    warn!(parent: ctx.span(), action, error = %cause, "Action failed");
                }
            }
            Some(WorkflowError::Exit) => {
                debug!(parent: ctx.span(), action, "Action exited");
            }
            _ => {
                debug!(
                    parent: ctx.span(),
                    action,
                    requeue = result.requeue,
                    requeue_after_ms = result.requeue_after.as_millis(),
                    "Action finished"
                );
            }
        }
    }
}
