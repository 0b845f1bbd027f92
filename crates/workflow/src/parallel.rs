//! Run an action on its own task.

use std::panic;

use crate::action::Action;
use crate::context::Context;
use crate::error::Error;
use crate::result::ActionResult;

/// Runs the inner action on a fresh task and waits for it.
#[derive(Clone)]
pub struct Parallel {
    pub(crate) inner: Box<Action>,
}

impl Parallel {
    /// The wrapped action.
    pub fn inner(&self) -> &Action {
        &self.inner
    }

    pub(crate) fn describe(&self) -> String {
        format!("Parallel({})", self.inner.describe())
    }

    pub(crate) async fn run(&self, ctx: &Context) -> ActionResult {
        let act = (*self.inner).clone();
        let ctx = ctx.clone();
        match tokio::spawn(async move { act.run(&ctx).await }).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
            Err(_) => ActionResult::from_error(Error::TaskAborted),
        }
    }
}

/// Wrap the action so it runs on its own task. Wrapping a [`Parallel`]
/// again returns it unchanged.
pub fn parallel(act: Action) -> Action {
    match act {
        Action::Parallel(_) => act,
        other => Action::Parallel(Parallel {
            inner: Box::new(other),
        }),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use futures::FutureExt;

    use super::*;
    use crate::action::new_action;
    use crate::result::requeue_immediately;

    fn boom() -> ActionResult {
        panic!("boom")
    }

    #[test]
    fn test_parallel_is_idempotent() {
        let act = new_action("A", |_| async { requeue_immediately() });
        let once = parallel(act);
        let twice = parallel(once.clone());
        assert_eq!(once.describe(), "Parallel(A)");
        assert_eq!(twice.describe(), "Parallel(A)");
    }

    #[tokio::test]
    async fn test_runs_on_another_task() {
        let act = parallel(new_action("A", |_| async { requeue_immediately() }));
        assert!(act.run(&Context::background()).await.requeue);
    }

    #[tokio::test]
    async fn test_panic_is_reraised() {
        let act = parallel(new_action("Boom", |_| async { boom() }));
        let caught = std::panic::AssertUnwindSafe(act.run(&Context::background()))
            .catch_unwind()
            .await;
        assert_eq!(caught.err().unwrap().downcast_ref::<&str>(), Some(&"boom"));
    }
}
