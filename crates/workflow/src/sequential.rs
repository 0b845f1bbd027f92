//! Sequential flow.

use crate::action::{describe_group, Action};
use crate::context::Context;
use crate::error::{BuildError, Result};
use crate::result::{no_requeue, ActionResult};

/// Runs children in declared order and stops at the first child whose
/// result needs a requeue, handing that result back verbatim.
///
/// This is the only combinator that orders side effects between children.
#[derive(Clone)]
pub struct Sequential {
    pub(crate) children: Vec<Action>,
}

impl Sequential {
    /// The children in declared order.
    pub fn children(&self) -> &[Action] {
        &self.children
    }

    pub(crate) fn describe(&self) -> String {
        describe_group("Sequential", &self.children)
    }

    pub(crate) async fn run(&self, ctx: &Context) -> ActionResult {
        for act in &self.children {
            let result = act.run(ctx).await;
            if result.needs_requeue() {
                return result;
            }
        }
        no_requeue()
    }
}

/// Organize actions into a sequential flow.
///
/// # Errors
///
/// Returns [`BuildError::EmptyGroup`] when `actions` is empty.
pub fn sequential(actions: impl IntoIterator<Item = Action>) -> Result<Action> {
    let children: Vec<Action> = actions.into_iter().collect();
    if children.is_empty() {
        return Err(BuildError::empty_group("Sequential"));
    }
    Ok(Action::Sequential(Sequential { children }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::action::new_action;
    use crate::result::{exit_if, proceed, requeue_after, requeue_immediately};

    fn counting(name: &str, counter: &Arc<AtomicUsize>, result: ActionResult) -> Action {
        let counter = counter.clone();
        new_action(name, move |_| {
            let counter = counter.clone();
            let result = result.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                result
            }
        })
    }

    #[test]
    fn test_empty_sequential_is_an_error() {
        assert_eq!(
            sequential(Vec::new()).err(),
            Some(BuildError::empty_group("Sequential"))
        );
    }

    #[test]
    fn test_description() {
        let a = new_action("A", |_| async { proceed() });
        let b = new_action("B", |_| async { proceed() });
        assert_eq!(sequential([a, b]).unwrap().describe(), "Sequential(A, B)");
    }

    #[tokio::test]
    async fn test_runs_all_children_when_clean() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seq = sequential([
            counting("A", &counter, proceed()),
            counting("B", &counter, proceed()),
            counting("C", &counter, proceed()),
        ])
        .unwrap();

        let r = seq.run(&Context::background()).await;
        assert!(!r.needs_requeue());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_requeue_after() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seq = sequential([
            new_action("A", |_| async { requeue_after(Duration::from_secs(2)) }),
            counting("B", &counter, proceed()),
        ])
        .unwrap();

        let r = seq.run(&Context::background()).await;
        assert_eq!(r.requeue_after, Duration::from_secs(2));
        assert!(!r.requeue);
        assert!(r.error.is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stops_at_requeue_and_error() {
        let counter = Arc::new(AtomicUsize::new(0));
        let seq = sequential([
            counting("A", &counter, requeue_immediately()),
            counting("B", &counter, proceed()),
        ])
        .unwrap();
        assert!(seq.run(&Context::background()).await.requeue);
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let counter = Arc::new(AtomicUsize::new(0));
        let seq = sequential([
            counting("A", &counter, ActionResult::from_error("boom")),
            counting("B", &counter, proceed()),
        ])
        .unwrap();
        assert!(seq.run(&Context::background()).await.is_failure());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exit_short_circuits_at_position() {
        for k in 0..4 {
            let counter = Arc::new(AtomicUsize::new(0));
            let mut children: Vec<Action> = (0..4)
                .map(|i| counting(&format!("A{i}"), &counter, proceed()))
                .collect();
            children.insert(k, new_action("Barrier", |_| async { exit_if(true) }));

            let r = sequential(children).unwrap().run(&Context::background()).await;
            assert!(r.is_exit());
            assert_eq!(counter.load(Ordering::SeqCst), k);
        }
    }
}
