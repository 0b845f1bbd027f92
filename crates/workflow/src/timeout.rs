//! Bound an action with a deadline.

use std::time::Duration;

use crate::action::Action;
use crate::context::Context;
use crate::result::ActionResult;

/// Runs the inner action under a child context that expires after
/// `timeout`. Cancellation is cooperative: the inner action observes the
/// deadline through its [`Context`].
#[derive(Clone)]
pub struct Timeout {
    pub(crate) timeout: Duration,
    pub(crate) inner: Box<Action>,
}

impl Timeout {
    /// The deadline relative to the start of the run.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The wrapped action.
    pub fn inner(&self) -> &Action {
        &self.inner
    }

    pub(crate) fn describe(&self) -> String {
        format!("Timeout({}, timeout={:?})", self.inner.describe(), self.timeout)
    }

    pub(crate) async fn run(&self, ctx: &Context) -> ActionResult {
        let (ctx, _guard) = ctx.with_timeout(self.timeout);
        self.inner.run(&ctx).await
    }
}

/// Wrap the action with a timeout.
pub fn timeout(timeout: Duration, act: Action) -> Action {
    Action::Timeout(Timeout {
        timeout,
        inner: Box::new(act),
    })
}
