//! Operator configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is a valid
//! configuration.
//!
//! ```toml
//! [log]
//! filter = "info,rwo_reconciler=debug"
//!
//! [controller]
//! status_conflict_requeue_ms = 10
//!
//! [loop]
//! max_concurrent_reconciles = 64
//! base_backoff_ms = 5
//! max_backoff_ms = 10000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::controller::{ControllerConfig, PAUSE_RECONCILE_ANNOTATION};
use crate::error::{Error, Result};
use crate::r#loop::LoopConfig;

/// Top-level operator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    pub log: LogSettings,
    pub controller: ControllerSettings,
    #[serde(rename = "loop")]
    pub reconcile_loop: LoopSettings,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub filter: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    pub pause_annotation: String,
    pub status_conflict_requeue_ms: u64,
    pub meta_ready_timeout_ms: u64,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            pause_annotation: PAUSE_RECONCILE_ANNOTATION.to_string(),
            status_conflict_requeue_ms: 10,
            meta_ready_timeout_ms: 1000,
        }
    }
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    pub max_concurrent_reconciles: usize,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub resync_interval_ms: u64,
    /// Consecutive failures after which a key is parked until the next
    /// resync. Zero never parks.
    pub max_consecutive_errors: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_concurrent_reconciles: 64,
            base_backoff_ms: 5,
            max_backoff_ms: 10_000,
            resync_interval_ms: 600_000,
            max_consecutive_errors: 0,
        }
    }
}

impl OperatorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!("unable to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&source)
    }

    /// Check the values are consistent.
    pub fn validate(&self) -> Result<()> {
        let lp = &self.reconcile_loop;
        if lp.max_concurrent_reconciles == 0 {
            return Err(Error::invalid_config(
                "loop.max_concurrent_reconciles must be positive",
            ));
        }
        if lp.base_backoff_ms == 0 {
            return Err(Error::invalid_config("loop.base_backoff_ms must be positive"));
        }
        if lp.base_backoff_ms > lp.max_backoff_ms {
            return Err(Error::invalid_config(format!(
                "loop.base_backoff_ms ({}) exceeds loop.max_backoff_ms ({})",
                lp.base_backoff_ms, lp.max_backoff_ms
            )));
        }
        if lp.resync_interval_ms == 0 {
            return Err(Error::invalid_config("loop.resync_interval_ms must be positive"));
        }
        if self.controller.meta_ready_timeout_ms == 0 {
            return Err(Error::invalid_config(
                "controller.meta_ready_timeout_ms must be positive",
            ));
        }
        if self.controller.pause_annotation.is_empty() {
            return Err(Error::invalid_config(
                "controller.pause_annotation must not be empty",
            ));
        }
        Ok(())
    }

    /// Controller configuration.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            pause_annotation: self.controller.pause_annotation.clone(),
            status_conflict_requeue: Duration::from_millis(
                self.controller.status_conflict_requeue_ms,
            ),
            meta_ready_timeout: Duration::from_millis(self.controller.meta_ready_timeout_ms),
        }
    }

    /// Loop configuration.
    pub fn loop_config(&self) -> LoopConfig {
        let lp = &self.reconcile_loop;
        LoopConfig {
            max_concurrent_reconciles: lp.max_concurrent_reconciles,
            base_backoff: Duration::from_millis(lp.base_backoff_ms),
            max_backoff: Duration::from_millis(lp.max_backoff_ms),
            resync_interval: Duration::from_millis(lp.resync_interval_ms),
            max_consecutive_errors: lp.max_consecutive_errors,
        }
    }
}
