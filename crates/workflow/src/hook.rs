//! Observation hooks around leaf actions.
//!
//! A hook sees the action name and a snapshot of the state it reads before
//! the action runs, and the result after. Chained hooks run their pre hooks
//! in insertion order and their post hooks in reverse.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use crate::action::{new_action, Action};
use crate::context::Context;
use crate::result::ActionResult;

/// Named state an action reads, as seen right before it runs.
pub type StateSnapshot = BTreeMap<String, serde_json::Value>;

/// Hooks called around an instrumented action.
pub trait ActionHook: Send + Sync {
    /// Called before the action runs.
    fn pre_run(&self, ctx: &Context, action: &str, states: &StateSnapshot);

    /// Called after the action returns.
    fn post_run(&self, ctx: &Context, action: &str, result: &ActionResult);
}

/// A stack of hooks that behaves as one.
#[derive(Clone, Default)]
pub struct ChainedHooks {
    hooks: Vec<Arc<dyn ActionHook>>,
}

impl ChainedHooks {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a hook onto the chain.
    pub fn add(&mut self, hook: Arc<dyn ActionHook>) -> &mut Self {
        self.hooks.push(hook);
        self
    }

    /// Number of hooks in the chain.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl ActionHook for ChainedHooks {
    fn pre_run(&self, ctx: &Context, action: &str, states: &StateSnapshot) {
        for hook in &self.hooks {
            hook.pre_run(ctx, action, states);
        }
    }

    fn post_run(&self, ctx: &Context, action: &str, result: &ActionResult) {
        for hook in self.hooks.iter().rev() {
            hook.post_run(ctx, action, result);
        }
    }
}

/// Chain hooks into one.
pub fn chain_action_hooks(hooks: impl IntoIterator<Item = Arc<dyn ActionHook>>) -> ChainedHooks {
    ChainedHooks {
        hooks: hooks.into_iter().collect(),
    }
}

/// Wrap a function into an action whose runs are reported to `hook`.
///
/// `snapshot` is taken right before each run and handed to
/// [`ActionHook::pre_run`].
pub fn instrument<S, F, Fut>(
    name: impl Into<String>,
    hook: Arc<dyn ActionHook>,
    snapshot: S,
    f: F,
) -> Action
where
    S: Fn() -> StateSnapshot + Send + Sync + 'static,
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    let name: Arc<str> = Arc::from(name.into());
    let snapshot = Arc::new(snapshot);
    let f = Arc::new(f);

    new_action(name.to_string(), move |ctx: Context| {
        let name = name.clone();
        let hook = hook.clone();
        let snapshot = snapshot.clone();
        let f = f.clone();
        async move {
            hook.pre_run(&ctx, &name, &snapshot());
            let result = f(ctx.clone()).await;
            hook.post_run(&ctx, &name, &result);
            result
        }
    })
}
