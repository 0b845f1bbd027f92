//! Managers used by the reconcile workflow.
//!
//! [`RisingWaveManager`] holds two images of the object being reconciled:
//! the one read from the store, which every barrier reads, and a mutable
//! copy that actions write to and that is pushed back as the new status at
//! the end of the pass. [`ControllerManager`] builds the named actions the
//! workflow is made of.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use rwo_workflow::{
    exit, exit_if, instrument, proceed, requeue_if_error_and_wrap, Action, ActionHook,
    ActionResult, Context, Error as WorkflowError, StateSnapshot,
};
use tracing::debug;

use crate::components::{ComponentManager, ManagedObject};
use crate::error::StoreError;
use crate::events::{MessageStore, RisingWaveEvent};
use crate::store::ObjectStore;
use crate::types::{Condition, ConditionStatus, ConditionType, RisingWave, RisingWaveStatus};

/// Name of the action that writes the status back to the store.
pub const UPDATE_STATUS_ACTION: &str = "UpdateRisingWaveStatusViaClient";

/// Read-original, write-copy access to the object being reconciled.
#[derive(Debug)]
pub struct RisingWaveManager {
    original: RisingWave,
    mutable: RwLock<RisingWave>,
}

impl RisingWaveManager {
    /// Create a manager for an object as read from the store.
    pub fn new(risingwave: RisingWave) -> Self {
        Self {
            mutable: RwLock::new(risingwave.clone()),
            original: risingwave,
        }
    }

    /// The object as read from the store.
    pub fn risingwave(&self) -> &RisingWave {
        &self.original
    }

    /// The object with every write of this pass applied.
    pub fn after_image(&self) -> RisingWave {
        self.mutable.read().clone()
    }

    /// Check if the condition exists with the given status in the object as
    /// read.
    pub fn is_condition(&self, type_: ConditionType, value: bool) -> bool {
        self.original.is_condition(type_, ConditionStatus::from(value))
    }

    /// Check if the object as read carries no condition at all.
    pub fn has_no_conditions(&self) -> bool {
        self.original.status.conditions.is_empty()
    }

    /// Check if the spec changed since the last synced generation.
    pub fn is_observed_generation_outdated(&self) -> bool {
        self.original.is_observed_generation_outdated()
    }

    /// Set a condition on the copy.
    pub fn update_condition(&self, cond: Condition) {
        self.mutable.write().status.set_condition(cond, Utc::now());
    }

    /// Remove a condition from the copy.
    pub fn remove_condition(&self, type_: ConditionType) {
        self.mutable.write().status.remove_condition(type_);
    }

    /// Record the current generation as observed.
    pub fn sync_observed_generation(&self) {
        let mut rw = self.mutable.write();
        rw.status.observed_generation = rw.metadata.generation;
    }

    /// Edit the status of the copy.
    pub fn update_status(&self, f: impl FnOnce(&mut RisingWaveStatus)) {
        f(&mut self.mutable.write().status);
    }

    /// Write the status of the copy to the store. Does nothing when the
    /// status did not change.
    pub async fn update_remote_status(&self, store: &dyn ObjectStore) -> Result<(), StoreError> {
        let status = self.mutable.read().status.clone();
        if status == self.original.status {
            return Ok(());
        }
        store.update_status(&self.original, &status).await
    }
}

/// Builds the named actions of the RisingWave workflow.
///
/// Every action is instrumented with the hook the manager was built with
/// and snapshots the object before it runs.
#[derive(Clone)]
pub struct ControllerManager {
    risingwave: Arc<RisingWaveManager>,
    components: Arc<dyn ComponentManager>,
    messages: Arc<MessageStore>,
    hook: Arc<dyn ActionHook>,
}

impl ControllerManager {
    /// Create a new controller manager.
    pub fn new(
        risingwave: Arc<RisingWaveManager>,
        components: Arc<dyn ComponentManager>,
        messages: Arc<MessageStore>,
        hook: Arc<dyn ActionHook>,
    ) -> Self {
        Self {
            risingwave,
            components,
            messages,
            hook,
        }
    }

    /// The object manager.
    pub fn risingwave(&self) -> &Arc<RisingWaveManager> {
        &self.risingwave
    }

    /// Wrap a function into an instrumented action.
    pub fn new_action<F, Fut>(&self, name: impl Into<String>, f: F) -> Action
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ActionResult> + Send + 'static,
    {
        let risingwave = self.risingwave.clone();
        instrument(name, self.hook.clone(), move || snapshot(&risingwave), f)
    }

    /// Exit unless this is the first time the object is seen.
    pub fn barrier_first_time_observed(&self) -> Action {
        let rw = self.risingwave.clone();
        self.new_action("BarrierFirstTimeObserved", move |_| {
            let rw = rw.clone();
            async move { exit_if(!rw.has_no_conditions()) }
        })
    }

    /// Exit unless the condition exists with the given status.
    pub fn barrier_condition(&self, type_: ConditionType, value: bool) -> Action {
        let rw = self.risingwave.clone();
        let name = format!("BarrierCondition{type_}Is{}", title(value));
        self.new_action(name, move |_| {
            let rw = rw.clone();
            async move { exit_if(!rw.is_condition(type_, value)) }
        })
    }

    /// Exit unless the spec changed since the last synced generation.
    pub fn barrier_observed_generation_outdated(&self) -> Action {
        let rw = self.risingwave.clone();
        self.new_action("BarrierObservedGenerationOutdated", move |_| {
            let rw = rw.clone();
            async move { exit_if(!rw.is_observed_generation_outdated()) }
        })
    }

    /// Exit unless the monitoring CRDs are installed.
    pub fn barrier_service_monitor_served(&self) -> Action {
        let components = self.components.clone();
        self.new_action("BarrierPrometheusCRDsInstalled", move |_| {
            let components = components.clone();
            async move {
                match components.is_service_monitor_served().await {
                    Ok(served) => exit_if(!served),
                    Err(e) => requeue_if_error_and_wrap(
                        "unable to check service monitor crds",
                        Err::<(), _>(e),
                    ),
                }
            }
        })
    }

    /// Set a condition.
    pub fn mark_condition(&self, type_: ConditionType, value: bool) -> Action {
        let rw = self.risingwave.clone();
        let name = format!("MarkCondition{type_}As{}", title(value));
        self.new_action(name, move |_| {
            let rw = rw.clone();
            async move {
                rw.update_condition(Condition::new(type_, value));
                proceed()
            }
        })
    }

    /// Remove a condition.
    pub fn remove_condition(&self, type_: ConditionType) -> Action {
        let rw = self.risingwave.clone();
        self.new_action(format!("RemoveCondition{type_}"), move |_| {
            let rw = rw.clone();
            async move {
                rw.remove_condition(type_);
                proceed()
            }
        })
    }

    /// Record the current generation as observed.
    pub fn sync_observed_generation(&self) -> Action {
        let rw = self.risingwave.clone();
        self.new_action("SyncObservedGeneration", move |_| {
            let rw = rw.clone();
            async move {
                rw.sync_observed_generation();
                proceed()
            }
        })
    }

    /// Create or update a managed object.
    pub fn sync(&self, object: ManagedObject) -> Action {
        let rw = self.risingwave.clone();
        let components = self.components.clone();
        self.new_action(format!("Sync{}", object.action_suffix()), move |_| {
            let rw = rw.clone();
            let components = components.clone();
            async move {
                let res = components.sync(rw.risingwave(), object).await;
                requeue_if_error_and_wrap(format!("unable to sync {object}"), res)
            }
        })
    }

    /// Exit until a managed object is ready.
    ///
    /// Returns the context error if the context ends before the readiness
    /// check does.
    pub fn wait_before_ready(&self, object: ManagedObject) -> Action {
        let rw = self.risingwave.clone();
        let components = self.components.clone();
        let name = match object {
            ManagedObject::Service(c) => format!("WaitBefore{}ServiceIsAvailable", c.title()),
            other => format!("WaitBefore{}Ready", other.action_suffix()),
        };
        self.new_action(name, move |ctx: Context| {
            let rw = rw.clone();
            let components = components.clone();
            async move {
                let ready = tokio::select! {
                    res = components.is_ready(rw.risingwave(), object) => res,
                    () = ctx.done() => {
                        return ActionResult::from_error(
                            ctx.err().unwrap_or(WorkflowError::Cancelled),
                        );
                    }
                };
                match ready {
                    Ok(true) => proceed(),
                    Ok(false) => {
                        debug!(parent: ctx.span(), object = %object, "Not ready, keep waiting");
                        exit()
                    }
                    Err(e) => requeue_if_error_and_wrap(
                        format!("unable to check {object}"),
                        Err::<(), _>(e),
                    ),
                }
            }
        })
    }

    /// Collect component replicas into the status and flag broken or
    /// missing objects.
    pub fn collect_running_statistics_and_sync_status(&self) -> Action {
        let rw = self.risingwave.clone();
        let components = self.components.clone();
        let messages = self.messages.clone();
        self.new_action("CollectRunningStatisticsAndSyncStatus", move |_| {
            let rw = rw.clone();
            let components = components.clone();
            let messages = messages.clone();
            async move {
                let observed = match components.observe(rw.risingwave()).await {
                    Ok(observed) => observed,
                    Err(e) => {
                        return requeue_if_error_and_wrap(
                            "unable to collect running statistics",
                            Err::<(), _>(e),
                        );
                    }
                };

                let version = rw.risingwave().version().to_string();
                rw.update_status(|status| {
                    status.component_replicas = observed.replicas;
                    status.version = version;
                });

                if !observed.missing.is_empty() {
                    rw.update_condition(Condition::new(ConditionType::Running, false));
                    if rw.is_condition(ConditionType::Running, true) {
                        messages.set_message(
                            RisingWaveEvent::Unhealthy.reason(),
                            format!(
                                "Found components broken or missing: {}",
                                observed.missing.iter().join(",")
                            ),
                        );
                    }
                }
                proceed()
            }
        })
    }

    /// Write the status back to the store.
    ///
    /// A vanished object ends the pass quietly; a conflict asks for another
    /// pass after `conflict_requeue`.
    pub fn update_remote_status(
        &self,
        store: Arc<dyn ObjectStore>,
        conflict_requeue: std::time::Duration,
    ) -> Action {
        let rw = self.risingwave.clone();
        self.new_action(UPDATE_STATUS_ACTION, move |ctx: Context| {
            let rw = rw.clone();
            let store = store.clone();
            async move {
                match rw.update_remote_status(store.as_ref()).await {
                    Ok(()) => proceed(),
                    Err(StoreError::NotFound { .. }) => {
                        debug!(parent: ctx.span(), "Object not found, skip status update");
                        proceed()
                    }
                    Err(e @ StoreError::Conflict { .. }) => {
                        debug!(parent: ctx.span(), error = %e, "Conflict on status update, requeue");
                        rwo_workflow::requeue_after(conflict_requeue)
                    }
                    Err(e) => requeue_if_error_and_wrap("unable to update status", Err::<(), _>(e)),
                }
            }
        })
    }
}

fn title(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn snapshot(rw: &RisingWaveManager) -> StateSnapshot {
    let mut states = StateSnapshot::new();
    match serde_json::to_value(rw.after_image()) {
        Ok(value) => {
            states.insert("risingwave".to_string(), value);
        }
        Err(e) => debug!(error = %e, "Unable to snapshot risingwave"),
    }
    states
}
