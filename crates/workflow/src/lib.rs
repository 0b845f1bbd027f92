//! Composable reconcile workflows.
//!
//! A reconcile pass is written as a tree of [`Action`]s: named leaves that
//! do the work, glued together by combinators that decide ordering,
//! concurrency, retries and deadlines. Every action returns an
//! [`ActionResult`] that says whether the object needs another pass, when,
//! and with what error.
//!
//! - **Groups**: [`sequential`] stops at the first child asking for a
//!   requeue; [`join`], [`ordered_join`] and [`parallel_join`] run every
//!   child and fold the results.
//! - **Decorators**: [`parallel`], [`timeout`], [`retry`],
//!   [`retry_interval`] and [`shared`] wrap a single child.
//! - **Exit**: [`exit_if`] stops the surrounding sequence without counting
//!   as a failure. State-machine barriers are written with it.
//! - **Optimizer**: [`optimize_workflow`] rewrites a tree into canonical form
//!   before it runs.
//! - **Observation**: [`instrument`] reports leaf runs to an [`ActionHook`],
//!   [`dry_run`] dumps the tree without running it.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use rwo_workflow::{
//!     exit_if, new_action, optimize_workflow, parallel_join, proceed, sequential, timeout,
//!     Context,
//! };
//!
//! # async fn demo() -> rwo_workflow::Result<()> {
//! let ready = false;
//! let workflow = sequential([
//!     new_action("SyncConfigs", |_| async { proceed() }),
//!     parallel_join([
//!         new_action("SyncMetaService", |_| async { proceed() }),
//!         new_action("SyncFrontendService", |_| async { proceed() }),
//!     ]),
//!     new_action("BarrierMetaReady", move |_| async move { exit_if(!ready) }),
//!     timeout(
//!         Duration::from_secs(1),
//!         new_action("WaitMetaService", |_| async { proceed() }),
//!     ),
//! ])?;
//!
//! let result = optimize_workflow(workflow).run(&Context::background()).await;
//! assert!(result.is_exit());
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod action;
pub mod conditional;
pub mod context;
pub mod dryrun;
pub mod error;
pub mod hook;
pub mod join;
pub mod optimize;
pub mod parallel;
pub mod result;
pub mod retry;
pub mod sequential;
pub mod shared;
pub mod timeout;

// Re-export main types
pub use action::{new_action, nop, Action, Leaf};
pub use conditional::{if_else, if_then};
pub use context::Context;
pub use dryrun::dry_run;
pub use error::{BuildError, Error, MultiError, Result};
pub use hook::{chain_action_hooks, instrument, ActionHook, ChainedHooks, StateSnapshot};
pub use join::{
    join, join_in_parallel, ordered_join, parallel_join, sequential_join, Join, JoinMode,
};
pub use optimize::optimize_workflow;
pub use parallel::{parallel, Parallel};
pub use result::{
    exit, exit_if, ignore_exit, join_error, join_result, join_trailing, needs_requeue, no_requeue,
    proceed, requeue_after, requeue_if_error, requeue_if_error_and_wrap, requeue_immediately,
    ActionResult,
};
pub use retry::{retry, retry_interval, Retry};
pub use sequential::{sequential, Sequential};
pub use shared::{shared, Shared};
pub use timeout::{timeout, Timeout};

/// Re-exported so callers can hold the cancel handle of a derived context.
pub use tokio_util::sync::CancellationToken;
