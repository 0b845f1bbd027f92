//! Split-join flows.
//!
//! Both flavors run every child and fold the results with
//! [`join_result`](crate::join_result). They differ only in how children are
//! scheduled: one after another on the caller's task, or each on its own
//! task.

use std::panic;

use futures::future;
use rand::seq::SliceRandom;

use crate::action::{describe_group, Action};
use crate::context::Context;
use crate::error::Error;
use crate::parallel::parallel;
use crate::result::{join_result, no_requeue, ActionResult};

/// How the children of a [`Join`] are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinMode {
    /// One by one on the caller's task.
    Sequential,
    /// Each child on its own task.
    Parallel,
}

/// A split-join group.
#[derive(Clone)]
pub struct Join {
    pub(crate) mode: JoinMode,
    pub(crate) children: Vec<Action>,
}

impl Join {
    /// Scheduling flavor.
    pub fn mode(&self) -> JoinMode {
        self.mode
    }

    /// Check if children run on their own tasks.
    pub fn is_parallel(&self) -> bool {
        self.mode == JoinMode::Parallel
    }

    /// The children in run order.
    pub fn children(&self) -> &[Action] {
        &self.children
    }

    /// `Join` or `ParallelJoin`.
    pub fn name(&self) -> &'static str {
        match self.mode {
            JoinMode::Sequential => "Join",
            JoinMode::Parallel => "ParallelJoin",
        }
    }

    pub(crate) fn describe(&self) -> String {
        describe_group(self.name(), &self.children)
    }

    pub(crate) async fn run(&self, ctx: &Context) -> ActionResult {
        let result = match self.mode {
            JoinMode::Sequential => run_one_by_one(&self.children, ctx).await,
            JoinMode::Parallel => run_in_parallel(&self.children, ctx).await,
        };
        settle_exit(result)
    }
}

async fn run_one_by_one(children: &[Action], ctx: &Context) -> ActionResult {
    let mut result = no_requeue();
    for act in children {
        let local = act.run(ctx).await;
        result = join_result(result, local);
    }
    result
}

/// Spawns every child, waits for all of them and re-raises the first panic
/// only after every sibling has finished.
async fn run_in_parallel(children: &[Action], ctx: &Context) -> ActionResult {
    let handles = children.iter().cloned().map(|act| {
        let ctx = ctx.clone();
        tokio::spawn(async move { act.run(&ctx).await })
    });
    let outcomes = future::join_all(handles).await;

    let mut result = no_requeue();
    let mut panicked = None;
    for outcome in outcomes {
        match outcome {
            Ok(local) => result = join_result(result, local),
            Err(err) if err.is_panic() => {
                if panicked.is_none() {
                    panicked = Some(err.into_panic());
                }
            }
            Err(_) => result = join_result(result, ActionResult::from_error(Error::TaskAborted)),
        }
    }

    if let Some(payload) = panicked {
        panic::resume_unwind(payload);
    }
    result
}

/// An exit reported by some siblings gives way to a requeue asked by others.
fn settle_exit(result: ActionResult) -> ActionResult {
    if result.is_exit() && (result.requeue || !result.requeue_after.is_zero()) {
        ActionResult {
            error: None,
            ..result
        }
    } else {
        result
    }
}

fn group(mode: JoinMode, mut actions: Vec<Action>) -> Action {
    match actions.len() {
        0 => Action::Nop,
        1 => actions.swap_remove(0),
        _ => Action::Join(Join {
            mode,
            children: actions,
        }),
    }
}

/// Organize actions into a split-join flow that makes no promise about
/// order. Children are shuffled so that hidden order dependencies surface.
pub fn join(actions: impl IntoIterator<Item = Action>) -> Action {
    let mut actions: Vec<Action> = actions.into_iter().collect();
    actions.shuffle(&mut rand::thread_rng());
    group(JoinMode::Sequential, actions)
}

/// Like [`join`], but children run in declared order.
pub fn ordered_join(actions: impl IntoIterator<Item = Action>) -> Action {
    group(JoinMode::Sequential, actions.into_iter().collect())
}

/// Alias of [`ordered_join`].
pub fn sequential_join(actions: impl IntoIterator<Item = Action>) -> Action {
    ordered_join(actions)
}

/// Organize actions into a split-join flow where every child runs on its
/// own task. A single child becomes [`parallel`] of that child.
pub fn parallel_join(actions: impl IntoIterator<Item = Action>) -> Action {
    let mut actions: Vec<Action> = actions.into_iter().collect();
    if actions.len() == 1 {
        return parallel(actions.swap_remove(0));
    }
    group(JoinMode::Parallel, actions)
}

/// Alias of [`parallel_join`].
pub fn join_in_parallel(actions: impl IntoIterator<Item = Action>) -> Action {
    parallel_join(actions)
}
