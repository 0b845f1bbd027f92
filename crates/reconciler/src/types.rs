//! Core types for the reconciler.
//!
//! A [`RisingWave`] is the object being reconciled: metadata, the desired
//! [`RisingWaveSpec`] and the observed [`RisingWaveStatus`]. The status
//! holds the conditions the reconcile state machine is driven by.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Namespace and name of an object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Create a new key.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Object metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Bumped on every spec change.
    #[serde(default)]
    pub generation: i64,
    /// Bumped on every write; used for optimistic concurrency.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Create metadata for a fresh object at generation 1.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            generation: 1,
            resource_version: 0,
            annotations: BTreeMap::new(),
            deletion_timestamp: None,
        }
    }
}

/// The components of a RisingWave cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Meta,
    Frontend,
    Compute,
    Compactor,
}

impl Component {
    /// Every component, in sync order.
    pub const ALL: [Self; 4] = [Self::Meta, Self::Frontend, Self::Compute, Self::Compactor];

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Frontend => "frontend",
            Self::Compute => "compute",
            Self::Compactor => "compactor",
        }
    }

    /// Capitalized name, as used in action names.
    pub fn title(self) -> &'static str {
        match self {
            Self::Meta => "Meta",
            Self::Frontend => "Frontend",
            Self::Compute => "Compute",
            Self::Compactor => "Compactor",
        }
    }

    /// Kind of the workload that runs the component's pods.
    pub fn workload_kind(self) -> &'static str {
        match self {
            Self::Compute => "StatefulSets",
            Self::Meta | Self::Frontend | Self::Compactor => "Deployments",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Desired state of one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    #[serde(default = "default_replicas")]
    pub replicas: i32,
    /// Overrides the cluster image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

fn default_replicas() -> i32 {
    1
}

impl Default for ComponentSpec {
    fn default() -> Self {
        Self {
            replicas: default_replicas(),
            image: None,
        }
    }
}

/// Desired state of every component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentsSpec {
    #[serde(default)]
    pub meta: ComponentSpec,
    #[serde(default)]
    pub frontend: ComponentSpec,
    #[serde(default)]
    pub compute: ComponentSpec,
    #[serde(default)]
    pub compactor: ComponentSpec,
}

impl ComponentsSpec {
    /// Spec of a component.
    pub fn get(&self, component: Component) -> &ComponentSpec {
        match component {
            Component::Meta => &self.meta,
            Component::Frontend => &self.frontend,
            Component::Compute => &self.compute,
            Component::Compactor => &self.compactor,
        }
    }
}

/// Desired state of a RisingWave cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RisingWaveSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub components: ComponentsSpec,
}

/// Conditions the reconcile state machine moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Initializing,
    Running,
    Upgrading,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Upgrading => "Upgrading",
        };
        f.write_str(name)
    }
}

/// Status of a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// A single status condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl Condition {
    /// Create a condition without a transition time.
    pub fn new(type_: ConditionType, status: impl Into<ConditionStatus>) -> Self {
        Self {
            type_,
            status: status.into(),
            last_transition_time: None,
            reason: String::new(),
            message: String::new(),
        }
    }
}

/// Target and running replicas of a component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub target: i32,
    pub running: i32,
}

/// Replicas of every component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentReplicas {
    pub meta: ReplicaStatus,
    pub frontend: ReplicaStatus,
    pub compute: ReplicaStatus,
    pub compactor: ReplicaStatus,
}

impl ComponentReplicas {
    /// Replicas of a component.
    pub fn get(&self, component: Component) -> ReplicaStatus {
        match component {
            Component::Meta => self.meta,
            Component::Frontend => self.frontend,
            Component::Compute => self.compute,
            Component::Compactor => self.compactor,
        }
    }

    /// Mutable replicas of a component.
    pub fn get_mut(&mut self, component: Component) -> &mut ReplicaStatus {
        match component {
            Component::Meta => &mut self.meta,
            Component::Frontend => &mut self.frontend,
            Component::Compute => &mut self.compute,
            Component::Compactor => &mut self.compactor,
        }
    }
}

/// Observed state of a RisingWave cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RisingWaveStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub component_replicas: ComponentReplicas,
    /// Version parsed from the image tag.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

impl RisingWaveStatus {
    /// Find a condition by type.
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// Insert or update a condition.
    ///
    /// The transition time is stamped when the condition is new or its
    /// status changes, and kept otherwise.
    pub fn set_condition(&mut self, mut cond: Condition, now: DateTime<Utc>) {
        match self.conditions.iter_mut().find(|c| c.type_ == cond.type_) {
            Some(existing) => {
                cond.last_transition_time = if existing.status == cond.status {
                    existing.last_transition_time
                } else {
                    Some(now)
                };
                *existing = cond;
            }
            None => {
                cond.last_transition_time = Some(now);
                self.conditions.push(cond);
            }
        }
    }

    /// Remove a condition by type.
    pub fn remove_condition(&mut self, type_: ConditionType) {
        self.conditions.retain(|c| c.type_ != type_);
    }
}

/// A RisingWave object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RisingWave {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: RisingWaveSpec,
    #[serde(default)]
    pub status: RisingWaveStatus,
}

impl RisingWave {
    /// Create an object with the given key and spec and an empty status.
    pub fn new(key: &ObjectKey, spec: RisingWaveSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(key.namespace.clone(), key.name.clone()),
            spec,
            status: RisingWaveStatus::default(),
        }
    }

    /// Parse an object from a YAML manifest.
    pub fn from_yaml(manifest: &str) -> Result<Self> {
        serde_yaml::from_str(manifest).map_err(|e| Error::invalid_manifest(e.to_string()))
    }

    /// Key of the object.
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    /// Find a status condition by type.
    pub fn condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.status.condition(type_)
    }

    /// Check if a condition is present with the given status.
    pub fn is_condition(&self, type_: ConditionType, status: ConditionStatus) -> bool {
        self.condition(type_).is_some_and(|c| c.status == status)
    }

    /// Check if the spec changed since the status was last synced.
    pub fn is_observed_generation_outdated(&self) -> bool {
        self.status.observed_generation < self.metadata.generation
    }

    /// Check if deletion was requested.
    pub fn is_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Version from the image tag, e.g. `v1.2.0` for
    /// `risingwavelabs/risingwave:v1.2.0`. Empty when the image has no tag.
    pub fn version(&self) -> &str {
        let image = self.spec.image.as_str();
        let name_end = image.rfind('/').map_or(0, |i| i.saturating_add(1));
        image
            .get(name_end..)
            .and_then(|name| name.split_once(':'))
            .map_or("", |(_, tag)| tag)
    }

    /// Check if the annotation is present.
    pub fn has_annotation(&self, key: &str) -> bool {
        self.metadata.annotations.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use chrono::TimeZone;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::new("default", "rw").to_string(), "default/rw");
    }

    #[test]
    fn test_set_condition_stamps_transitions() {
        let mut status = RisingWaveStatus::default();
        status.set_condition(Condition::new(ConditionType::Running, false), at(1));
        assert_eq!(
            status.condition(ConditionType::Running).unwrap().last_transition_time,
            Some(at(1))
        );

        // Same status keeps the original transition time.
        status.set_condition(Condition::new(ConditionType::Running, false), at(2));
        assert_eq!(
            status.condition(ConditionType::Running).unwrap().last_transition_time,
            Some(at(1))
        );

        status.set_condition(Condition::new(ConditionType::Running, true), at(3));
        let running = status.condition(ConditionType::Running).unwrap();
        assert_eq!(running.status, ConditionStatus::True);
        assert_eq!(running.last_transition_time, Some(at(3)));
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn test_remove_condition() {
        let mut status = RisingWaveStatus::default();
        status.set_condition(Condition::new(ConditionType::Initializing, true), at(1));
        status.set_condition(Condition::new(ConditionType::Running, false), at(1));
        status.remove_condition(ConditionType::Initializing);
        assert!(status.condition(ConditionType::Initializing).is_none());
        assert_eq!(status.conditions.len(), 1);
    }

    #[test]
    fn test_observed_generation_outdated() {
        let mut rw = RisingWave::new(&ObjectKey::new("default", "rw"), RisingWaveSpec::default());
        assert!(rw.is_observed_generation_outdated());
        rw.status.observed_generation = rw.metadata.generation;
        assert!(!rw.is_observed_generation_outdated());
    }

    #[test]
    fn test_from_yaml() {
        let manifest = r"
metadata:
  name: example
  annotations:
    risingwave.risingwavelabs.com/pause-reconcile: 'true'
spec:
  image: risingwave:v1
  components:
    compute:
      replicas: 3
";
        let rw = RisingWave::from_yaml(manifest).unwrap();
        assert_eq!(rw.key(), ObjectKey::new("default", "example"));
        assert_eq!(rw.spec.components.get(Component::Compute).replicas, 3);
        assert_eq!(rw.spec.components.get(Component::Meta).replicas, 1);
        assert!(rw.has_annotation("risingwave.risingwavelabs.com/pause-reconcile"));
        assert!(rw.status.conditions.is_empty());
    }

    #[test]
    fn test_from_yaml_rejects_garbage() {
        let err = RisingWave::from_yaml("spec: [").unwrap_err();
        assert!(matches!(err, Error::InvalidManifest { .. }));
    }

    #[test]
    fn test_version_from_image() {
        let mut rw = RisingWave::new(&ObjectKey::new("default", "rw"), RisingWaveSpec::default());
        rw.spec.image = "registry:5000/risingwavelabs/risingwave:v1.2.0".to_string();
        assert_eq!(rw.version(), "v1.2.0");
        rw.spec.image = "registry:5000/risingwave".to_string();
        assert_eq!(rw.version(), "");
    }

    #[test]
    fn test_component_names() {
        assert_eq!(Component::Compute.workload_kind(), "StatefulSets");
        assert_eq!(Component::Meta.workload_kind(), "Deployments");
        assert_eq!(Component::Compactor.title(), "Compactor");
    }
}
