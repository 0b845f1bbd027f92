//! The action atom.
//!
//! An [`Action`] is a closed set of node kinds: the no-op, a leaf wrapping a
//! user function, two group kinds and four single-child decorators. Every
//! node can describe itself and run under a [`Context`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use itertools::Itertools;

use crate::context::Context;
use crate::join::Join;
use crate::parallel::Parallel;
use crate::result::ActionResult;
use crate::retry::Retry;
use crate::sequential::Sequential;
use crate::shared::Shared;
use crate::timeout::Timeout;

type ActionFn = dyn Fn(Context) -> BoxFuture<'static, ActionResult> + Send + Sync;

/// A node of a reconcile workflow.
#[derive(Clone, Default)]
pub enum Action {
    /// Does nothing and returns an empty result.
    #[default]
    Nop,
    /// A named user function.
    Leaf(Leaf),
    /// Children in declared order, stopping at the first requeue.
    Sequential(Sequential),
    /// All children, results joined.
    Join(Join),
    /// The child on its own task.
    Parallel(Parallel),
    /// The child under a deadline.
    Timeout(Timeout),
    /// The child, again on failure.
    Retry(Retry),
    /// The child at most once, result memoized.
    Shared(Shared),
}

impl Action {
    /// Human-readable one-line description of the tree.
    pub fn describe(&self) -> String {
        match self {
            Self::Nop => "Nop".to_string(),
            Self::Leaf(leaf) => leaf.name().to_string(),
            Self::Sequential(seq) => seq.describe(),
            Self::Join(join) => join.describe(),
            Self::Parallel(parallel) => parallel.describe(),
            Self::Timeout(timeout) => timeout.describe(),
            Self::Retry(retry) => retry.describe(),
            Self::Shared(shared) => shared.describe(),
        }
    }

    /// Run the action.
    pub fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, ActionResult> {
        match self {
            Self::Nop => future::ready(ActionResult::default()).boxed(),
            Self::Leaf(leaf) => (leaf.func)(ctx.clone()),
            Self::Sequential(seq) => seq.run(ctx).boxed(),
            Self::Join(join) => join.run(ctx).boxed(),
            Self::Parallel(parallel) => parallel.run(ctx).boxed(),
            Self::Timeout(timeout) => timeout.run(ctx).boxed(),
            Self::Retry(retry) => retry.run(ctx).boxed(),
            Self::Shared(shared) => shared.run(ctx).boxed(),
        }
    }

    /// Check if this is the no-op.
    pub fn is_nop(&self) -> bool {
        matches!(self, Self::Nop)
    }

    /// Name of the node kind, or the leaf name.
    pub fn name(&self) -> &str {
        match self {
            Self::Nop => "Nop",
            Self::Leaf(leaf) => leaf.name(),
            Self::Sequential(_) => "Sequential",
            Self::Join(join) => join.name(),
            Self::Parallel(_) => "Parallel",
            Self::Timeout(_) => "Timeout",
            Self::Retry(_) => "Retry",
            Self::Shared(_) => "Shared",
        }
    }

    /// Children of a group, or the single child of a decorator.
    pub fn children(&self) -> Vec<&Action> {
        match self {
            Self::Nop | Self::Leaf(_) => Vec::new(),
            Self::Sequential(seq) => seq.children().iter().collect(),
            Self::Join(join) => join.children().iter().collect(),
            Self::Parallel(parallel) => vec![parallel.inner()],
            Self::Timeout(timeout) => vec![timeout.inner()],
            Self::Retry(retry) => vec![retry.inner()],
            Self::Shared(shared) => vec![shared.inner()],
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A named user function.
#[derive(Clone)]
pub struct Leaf {
    name: Arc<str>,
    func: Arc<ActionFn>,
}

impl Leaf {
    /// The name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// `Head(a, b, c)` for a group of actions.
pub(crate) fn describe_group(head: &str, actions: &[Action]) -> String {
    format!("{head}({})", actions.iter().map(Action::describe).join(", "))
}

/// The no-op action.
pub const fn nop() -> Action {
    Action::Nop
}

/// Wrap a name and an async function into an action.
///
/// The function receives an owned [`Context`] so the returned future can be
/// `'static`.
pub fn new_action<F, Fut>(name: impl Into<String>, f: F) -> Action
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    Action::Leaf(Leaf {
        name: Arc::from(name.into()),
        func: Arc::new(move |ctx| f(ctx).boxed()),
    })
}
