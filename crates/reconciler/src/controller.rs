//! The RisingWave controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rwo_workflow::{
    chain_action_hooks, dry_run, ignore_exit, join_trailing, no_requeue, optimize_workflow,
    requeue_if_error_and_wrap, Action, ActionHook, ActionResult, Context,
};
use tracing::{debug, error, info, info_span, Instrument};

use crate::components::ComponentManager;
use crate::error::{Result, StoreError};
use crate::events::{EventRecorder, MessageStore};
use crate::hooks::EventHook;
use crate::manager::{ControllerManager, RisingWaveManager};
use crate::store::ObjectStore;
use crate::types::{ObjectKey, RisingWave};
use crate::workflow::risingwave_workflow;

/// Annotation that pauses reconciliation of an object.
pub const PAUSE_RECONCILE_ANNOTATION: &str = "risingwave.risingwavelabs.com/pause-reconcile";

/// Reconciles one object per call.
#[async_trait]
pub trait Controller: Send + Sync {
    /// Run one reconcile pass for `key`.
    async fn reconcile(&self, key: &ObjectKey) -> ActionResult;
}

/// Configuration for the controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Annotation whose presence pauses reconciliation.
    pub pause_annotation: String,
    /// Requeue delay after a status update conflict.
    pub status_conflict_requeue: Duration,
    /// Timeout on the meta service availability wait.
    pub meta_ready_timeout: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            pause_annotation: PAUSE_RECONCILE_ANNOTATION.to_string(),
            status_conflict_requeue: Duration::from_millis(10),
            meta_ready_timeout: Duration::from_secs(1),
        }
    }
}

/// One reconcile pass: the optimized workflow and the status update that
/// always follows it.
pub struct ReconcileWorkflow {
    workflow: Action,
    update_status: Action,
}

impl ReconcileWorkflow {
    /// The workflow run before the status update.
    pub fn workflow(&self) -> &Action {
        &self.workflow
    }

    /// The status update.
    pub fn update_status(&self) -> &Action {
        &self.update_status
    }

    /// Compact description of the pass.
    pub fn describe(&self) -> String {
        format!(
            "{} then {}",
            self.workflow.describe(),
            self.update_status.describe()
        )
    }

    /// Indented tree of the pass.
    pub fn dry_run(&self) -> String {
        format!(
            "{}\nthen {}",
            dry_run(&self.workflow),
            dry_run(&self.update_status)
        )
    }

    /// Run the workflow, then the status update whatever the workflow
    /// returned. A workflow failure wins over a status update failure.
    pub async fn run(&self, ctx: &Context) -> ActionResult {
        let result = self.workflow.run(ctx).await;
        let status = self.update_status.run(ctx).await;
        join_trailing(result, status)
    }
}

/// Controller for RisingWave objects.
pub struct RisingWaveController {
    store: Arc<dyn ObjectStore>,
    components: Arc<dyn ComponentManager>,
    recorder: Arc<dyn EventRecorder>,
    action_hook: Option<Arc<dyn ActionHook>>,
    config: ControllerConfig,
}

impl RisingWaveController {
    /// Create a new controller.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        components: Arc<dyn ComponentManager>,
        recorder: Arc<dyn EventRecorder>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            components,
            recorder,
            action_hook: None,
            config,
        }
    }

    /// Install an extra hook, run after the event hook.
    #[must_use]
    pub fn with_action_hook(mut self, hook: Arc<dyn ActionHook>) -> Self {
        self.action_hook = Some(hook);
        self
    }

    /// The controller configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Build the reconcile pass for `risingwave` without running it.
    pub fn build_workflow(&self, risingwave: RisingWave) -> Result<ReconcileWorkflow> {
        let risingwave = Arc::new(RisingWaveManager::new(risingwave));
        let messages = Arc::new(MessageStore::new());

        let mut hooks = chain_action_hooks([Arc::new(EventHook::new(
            self.recorder.clone(),
            risingwave.clone(),
            messages.clone(),
        )) as Arc<dyn ActionHook>]);
        if let Some(hook) = &self.action_hook {
            hooks.add(hook.clone());
        }

        let mgr = ControllerManager::new(
            risingwave,
            self.components.clone(),
            messages,
            Arc::new(hooks),
        );
        let workflow = risingwave_workflow(&mgr, self.config.meta_ready_timeout)?;
        let update_status =
            mgr.update_remote_status(self.store.clone(), self.config.status_conflict_requeue);

        Ok(ReconcileWorkflow {
            workflow: optimize_workflow(workflow),
            update_status,
        })
    }

    async fn reconcile_object(&self, risingwave: RisingWave) -> ActionResult {
        if risingwave.has_annotation(&self.config.pause_annotation) {
            info!("Reconciliation paused, skip");
            return no_requeue();
        }
        if risingwave.is_deleted() {
            info!("Object deleted, skip");
            return no_requeue();
        }

        let workflow = match self.build_workflow(risingwave) {
            Ok(workflow) => workflow,
            Err(e) => {
                error!(error = %e, "Unable to build workflow");
                return requeue_if_error_and_wrap("unable to build workflow", Err::<(), _>(e));
            }
        };
        debug!(workflow = %workflow.describe(), "Running workflow");

        let ctx = Context::background();
        ignore_exit(workflow.run(&ctx).await)
    }
}

#[async_trait]
impl Controller for RisingWaveController {
    async fn reconcile(&self, key: &ObjectKey) -> ActionResult {
        let span = info_span!("reconcile", object = %key, generation = tracing::field::Empty);

        async {
            let risingwave = match self.store.get(key).await {
                Ok(risingwave) => risingwave,
                Err(StoreError::NotFound { .. }) => {
                    debug!("Object not found, skip");
                    return no_requeue();
                }
                Err(e) => {
                    error!(error = %e, "Unable to get risingwave");
                    return requeue_if_error_and_wrap("unable to get risingwave", Err::<(), _>(e));
                }
            };
            tracing::Span::current().record("generation", risingwave.metadata.generation);

            let result = self.reconcile_object(risingwave).await;
            match &result.error {
                Some(err) => error!(error = %err, "Reconcile failed"),
                None => info!(
                    requeue = result.requeue,
                    requeue_after_ms = result.requeue_after.as_millis(),
                    "Reconcile finished"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }
}
