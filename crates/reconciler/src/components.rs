//! The objects a RisingWave cluster is made of, and the seam that syncs
//! and observes them.
//!
//! Rendering and applying the objects themselves is left to a
//! [`ComponentManager`]; the reconcile workflow only decides when each
//! object is synced and waited on.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::types::{Component, ComponentReplicas, ObjectKey, ReplicaStatus, RisingWave};

/// An object owned by a RisingWave cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManagedObject {
    /// The shared configuration.
    ConfigMap,
    /// The service fronting a component.
    Service(Component),
    /// The workload running a component's pods.
    Workload(Component),
    /// The monitoring scrape target.
    ServiceMonitor,
}

impl ManagedObject {
    /// Objects every healthy cluster has.
    pub fn required() -> Vec<Self> {
        std::iter::once(Self::ConfigMap)
            .chain(Component::ALL.into_iter().map(Self::Service))
            .chain(Component::ALL.into_iter().map(Self::Workload))
            .collect()
    }

    /// Name fragment used by the sync and wait actions, e.g.
    /// `MetaService` or `ComputeStatefulSets`.
    pub fn action_suffix(self) -> String {
        match self {
            Self::ConfigMap => "ConfigConfigMap".to_string(),
            Self::Service(c) => format!("{}Service", c.title()),
            Self::Workload(c) => format!("{}{}", c.title(), c.workload_kind()),
            Self::ServiceMonitor => "ServiceMonitor".to_string(),
        }
    }
}

impl fmt::Display for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigMap => write!(f, "ConfigMap(config)"),
            Self::Service(c) => write!(f, "Service({c})"),
            Self::Workload(c) => write!(f, "{}({c})", c.workload_kind()),
            Self::ServiceMonitor => write!(f, "ServiceMonitor"),
        }
    }
}

/// What a [`ComponentManager`] sees of a running cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentObservation {
    pub replicas: ComponentReplicas,
    /// Required objects that are broken or missing.
    pub missing: Vec<ManagedObject>,
}

/// Syncs and observes the objects of a cluster.
#[async_trait]
pub trait ComponentManager: Send + Sync {
    /// Create or update an object to match the spec.
    async fn sync(&self, risingwave: &RisingWave, object: ManagedObject) -> Result<()>;

    /// Check if an object is up and ready.
    async fn is_ready(&self, risingwave: &RisingWave, object: ManagedObject) -> Result<bool>;

    /// Collect replica counts and missing objects.
    async fn observe(&self, risingwave: &RisingWave) -> Result<ComponentObservation>;

    /// Check if the monitoring CRDs are installed.
    async fn is_service_monitor_served(&self) -> Result<bool>;
}

#[derive(Default)]
struct InMemoryState {
    synced: BTreeMap<(ObjectKey, ManagedObject), usize>,
    failing: BTreeSet<ManagedObject>,
    unready: BTreeSet<ManagedObject>,
    service_monitor_served: bool,
}

/// Component manager that keeps objects in memory.
///
/// A synced object is ready unless marked otherwise; knobs let tests make
/// syncs fail or objects disappear.
#[derive(Default)]
pub struct InMemoryComponentManager {
    state: Mutex<InMemoryState>,
}

impl InMemoryComponentManager {
    /// Create a manager with nothing synced.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make syncs of `object` fail.
    pub fn fail_sync(&self, object: ManagedObject) {
        self.state.lock().failing.insert(object);
    }

    /// Mark `object` as ready or not once synced.
    pub fn set_ready(&self, object: ManagedObject, ready: bool) {
        let mut state = self.state.lock();
        if ready {
            state.unready.remove(&object);
        } else {
            state.unready.insert(object);
        }
    }

    /// Toggle whether the monitoring CRDs are served.
    pub fn set_service_monitor_served(&self, served: bool) {
        self.state.lock().service_monitor_served = served;
    }

    /// Drop a synced object, as if it was deleted out of band.
    pub fn remove(&self, key: &ObjectKey, object: ManagedObject) {
        self.state.lock().synced.remove(&(key.clone(), object));
    }

    /// How many times `object` was synced for `key`.
    pub fn sync_count(&self, key: &ObjectKey, object: ManagedObject) -> usize {
        self.state
            .lock()
            .synced
            .get(&(key.clone(), object))
            .copied()
            .unwrap_or(0)
    }

    fn is_up(state: &InMemoryState, key: &ObjectKey, object: ManagedObject) -> bool {
        state.synced.contains_key(&(key.clone(), object)) && !state.unready.contains(&object)
    }
}

#[async_trait]
impl ComponentManager for InMemoryComponentManager {
    async fn sync(&self, risingwave: &RisingWave, object: ManagedObject) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing.contains(&object) {
            return Err(Error::component_failed(object, "sync rejected"));
        }
        let count = state.synced.entry((risingwave.key(), object)).or_insert(0);
        *count = count.saturating_add(1);
        Ok(())
    }

    async fn is_ready(&self, risingwave: &RisingWave, object: ManagedObject) -> Result<bool> {
        Ok(Self::is_up(&self.state.lock(), &risingwave.key(), object))
    }

    async fn observe(&self, risingwave: &RisingWave) -> Result<ComponentObservation> {
        let state = self.state.lock();
        let key = risingwave.key();

        let mut replicas = ComponentReplicas::default();
        for component in Component::ALL {
            let target = risingwave.spec.components.get(component).replicas;
            let running = if Self::is_up(&state, &key, ManagedObject::Workload(component)) {
                target
            } else {
                0
            };
            *replicas.get_mut(component) = ReplicaStatus { target, running };
        }

        let missing = ManagedObject::required()
            .into_iter()
            .filter(|object| !state.synced.contains_key(&(key.clone(), *object)))
            .collect();

        Ok(ComponentObservation { replicas, missing })
    }

    async fn is_service_monitor_served(&self) -> Result<bool> {
        Ok(self.state.lock().service_monitor_served)
    }
}
