//! Error types for the reconciler crate.

use std::fmt;

use rwo_workflow::BuildError;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone)]
pub enum Error {
    /// Object not found in the store.
    ObjectNotFound { key: String },
    /// The object store failed.
    StoreFailed { reason: String },
    /// A managed component could not be synced or observed.
    ComponentFailed { object: String, reason: String },
    /// The reconcile workflow could not be built.
    BuildFailed { reason: String },
    /// A manifest could not be parsed.
    InvalidManifest { reason: String },
    /// Invalid configuration.
    InvalidConfig { reason: String },
    /// Reconciliation failed.
    ReconcileFailed { reason: String },
    /// Loop was stopped.
    LoopStopped,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectNotFound { key } => {
                write!(f, "risingwave '{key}' not found")
            }
            Self::StoreFailed { reason } => {
                write!(f, "object store failed: {reason}")
            }
            Self::ComponentFailed { object, reason } => {
                write!(f, "component '{object}' failed: {reason}")
            }
            Self::BuildFailed { reason } => {
                write!(f, "unable to build workflow: {reason}")
            }
            Self::InvalidManifest { reason } => {
                write!(f, "invalid manifest: {reason}")
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid configuration: {reason}")
            }
            Self::ReconcileFailed { reason } => {
                write!(f, "reconciliation failed: {reason}")
            }
            Self::LoopStopped => {
                write!(f, "reconciliation loop stopped")
            }
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Create a component failed error.
    pub fn component_failed(object: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::ComponentFailed {
            object: object.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an invalid manifest error.
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a reconcile failed error.
    pub fn reconcile_failed(reason: impl Into<String>) -> Self {
        Self::ReconcileFailed {
            reason: reason.into(),
        }
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        Self::BuildFailed {
            reason: err.to_string(),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { key } => Self::ObjectNotFound { key },
            other => Self::StoreFailed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<Error> for rwo_workflow::Error {
    fn from(err: Error) -> Self {
        Self::other(err)
    }
}

/// Failures of an [`ObjectStore`](crate::ObjectStore) call.
///
/// The harness maps each kind to a different reconcile verdict.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("risingwave '{key}' not found")]
    NotFound { key: String },

    /// The object changed since it was read.
    #[error("conflict on '{key}': resource version {expected} is stale")]
    Conflict { key: String, expected: u64 },

    /// Any other backend failure.
    #[error("store backend: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is a conflict error.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StoreError> for rwo_workflow::Error {
    fn from(err: StoreError) -> Self {
        Self::other(err)
    }
}
