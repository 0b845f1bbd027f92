//! Memoize an action across callers.
//!
//! The first caller starts the inner action on its own task; every
//! concurrent or later caller awaits the same task and observes the same
//! outcome. Dropping a caller never abandons the run. A panic in the inner
//! action is latched too and re-raised in every caller.

use std::any::Any;
use std::panic;
use std::sync::{Arc, OnceLock};

use futures::future::{BoxFuture, FutureExt};

use crate::action::Action;
use crate::context::Context;
use crate::error::Error;
use crate::result::ActionResult;

#[derive(Clone)]
enum Outcome {
    Finished(ActionResult),
    Panicked(String),
}

type Latch = futures::future::Shared<BoxFuture<'static, Outcome>>;

struct SharedCell {
    inner: Action,
    latch: OnceLock<Latch>,
}

/// Runs the inner action at most once. Clones share the latch.
#[derive(Clone)]
pub struct Shared {
    cell: Arc<SharedCell>,
}

impl Shared {
    pub(crate) fn from_inner(inner: Action) -> Self {
        Self {
            cell: Arc::new(SharedCell {
                inner,
                latch: OnceLock::new(),
            }),
        }
    }

    /// The wrapped action.
    pub fn inner(&self) -> &Action {
        &self.cell.inner
    }

    /// Check if the inner action has already run.
    pub fn is_done(&self) -> bool {
        self.cell
            .latch
            .get()
            .is_some_and(|latch| latch.peek().is_some())
    }

    /// Identity of the latch; clones report the same key.
    pub(crate) fn key(&self) -> usize {
        Arc::as_ptr(&self.cell) as usize
    }

    pub(crate) fn describe(&self) -> String {
        format!("Shared({})", self.cell.inner.describe())
    }

    /// Start the inner action on its own task, once.
    fn start(&self, ctx: &Context) -> Latch {
        self.cell
            .latch
            .get_or_init(|| {
                let act = self.cell.inner.clone();
                let ctx = ctx.clone();
                let handle = tokio::spawn(async move { act.run(&ctx).await });
                async move {
                    match handle.await {
                        Ok(result) => Outcome::Finished(result),
                        Err(err) if err.is_panic() => {
                            Outcome::Panicked(panic_message(err.into_panic().as_ref()))
                        }
                        Err(_) => Outcome::Finished(ActionResult::from_error(Error::TaskAborted)),
                    }
                }
                .boxed()
                .shared()
            })
            .clone()
    }

    pub(crate) async fn run(&self, ctx: &Context) -> ActionResult {
        match self.start(ctx).await {
            Outcome::Finished(result) => result,
            Outcome::Panicked(message) => panic::resume_unwind(Box::new(message)),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Wrap the action so it runs at most once. Wrapping a [`Shared`] again
/// returns it unchanged.
pub fn shared(act: Action) -> Action {
    match act {
        Action::Shared(_) => act,
        other => Action::Shared(Shared::from_inner(other)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use std::panic::AssertUnwindSafe;

    use super::*;
    use crate::action::new_action;
    use crate::result::requeue_after;

    fn boom() -> ActionResult {
        panic!("boom")
    }

    #[test]
    fn test_shared_is_idempotent() {
        let act = shared(new_action("A", |_| async { ActionResult::default() }));
        let again = shared(act.clone());
        assert_eq!(again.describe(), "Shared(A)");
        let (Action::Shared(a), Action::Shared(b)) = (&act, &again) else {
            panic!("expected shared actions");
        };
        assert_eq!(a.key(), b.key());
    }

    #[tokio::test]
    async fn test_runs_once_for_sequential_callers() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let act = shared(new_action("A", move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                requeue_after(Duration::from_secs(7))
            }
        }));

        let ctx = Context::background();
        for _ in 0..3 {
            let r = act.run(&ctx).await;
            assert_eq!(r.requeue_after, Duration::from_secs(7));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&"boom".to_string()), "boom");
        assert_eq!(panic_message(&42_u8), "panic with a non-string payload");
    }

    #[tokio::test]
    async fn test_panic_is_latched() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let act = shared(new_action("Boom", move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                boom()
            }
        }));

        for _ in 0..2 {
            let caught = AssertUnwindSafe(act.run(&Context::background()))
                .catch_unwind()
                .await;
            let payload = caught.err().unwrap();
            assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("boom"));
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    /// GIVEN a shared action whose first caller is dropped mid-run
    /// WHEN another caller runs it
    /// THEN the inner action still runs once and the outcome is shared
    #[tokio::test(start_paused = true)]
    async fn test_dropped_caller_does_not_rerun() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let act = shared(new_action("Slow", move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                requeue_after(Duration::from_secs(3))
            }
        }));

        let ctx = Context::background();
        let first = tokio::time::timeout(Duration::from_millis(5), act.run(&ctx)).await;
        assert!(first.is_err());

        let r = act.run(&ctx).await;
        assert_eq!(r.requeue_after, Duration::from_secs(3));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        let Action::Shared(s) = &act else {
            panic!("expected a shared action");
        };
        assert!(s.is_done());
    }
}
