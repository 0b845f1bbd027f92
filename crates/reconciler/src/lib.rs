//! RisingWave controller built on reconcile workflows.
//!
//! This crate wires the combinators of `rwo-workflow` into a controller:
//!
//! - **Object store**: [`ObjectStore`] loads RisingWave objects and writes
//!   their status with optimistic concurrency.
//! - **Components**: [`ComponentManager`] syncs and observes the objects a
//!   cluster is made of (config, services, workloads, service monitor).
//! - **Workflow**: [`risingwave_workflow`] is a condition state machine;
//!   each branch starts with a barrier that exits unless the object is in
//!   the state the branch handles.
//! - **Controller**: [`RisingWaveController`] runs one optimized workflow
//!   per reconcile and writes the status back, recording lifecycle events
//!   through [`EventHook`].
//! - **Loop**: [`ReconciliationLoop`] drives a [`Controller`] over every
//!   key, honoring requeue verdicts with per-key backoff.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rwo_reconciler::{
//!     ControllerConfig, InMemoryComponentManager, InMemoryObjectStore, LoopConfig,
//!     ReconciliationLoop, RisingWave, RisingWaveController, TracingEventRecorder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> rwo_reconciler::Result<()> {
//!     let store = Arc::new(InMemoryObjectStore::with_objects([RisingWave::from_yaml(
//!         "metadata:\n  name: example\n",
//!     )?]));
//!     let controller = Arc::new(RisingWaveController::new(
//!         store.clone(),
//!         Arc::new(InMemoryComponentManager::new()),
//!         Arc::new(TracingEventRecorder),
//!         ControllerConfig::default(),
//!     ));
//!
//!     let mut loop_runner = ReconciliationLoop::new(controller, store, LoopConfig::default());
//!     // Run until stopped
//!     // loop_runner.run().await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod components;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod hooks;
pub mod r#loop;
pub mod manager;
pub mod store;
pub mod types;
pub mod workflow;

// Re-export main types
pub use components::{ComponentManager, ComponentObservation, InMemoryComponentManager, ManagedObject};
pub use config::{ControllerSettings, LogSettings, LoopSettings, OperatorConfig};
pub use controller::{
    Controller, ControllerConfig, ReconcileWorkflow, RisingWaveController,
    PAUSE_RECONCILE_ANNOTATION,
};
pub use error::{Error, Result, StoreError};
pub use events::{
    Event, EventKind, EventRecorder, InMemoryEventRecorder, MessageStore, RisingWaveEvent,
    TracingEventRecorder,
};
pub use hooks::{EventHook, TracingHook};
pub use manager::{ControllerManager, RisingWaveManager, UPDATE_STATUS_ACTION};
pub use r#loop::{Enqueuer, LoopConfig, LoopStopper, ReconciliationLoop};
pub use store::{InMemoryObjectStore, ObjectStore};
pub use types::{
    Component, ComponentReplicas, ComponentSpec, ComponentsSpec, Condition, ConditionStatus,
    ConditionType, ObjectKey, ObjectMeta, ReplicaStatus, RisingWave, RisingWaveSpec,
    RisingWaveStatus,
};
pub use workflow::{risingwave_workflow, sync_all_and_wait};
