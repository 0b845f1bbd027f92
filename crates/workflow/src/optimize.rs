//! Canonicalize a workflow tree before it runs.
//!
//! The rewrite is a single bottom-up pass; every rule only looks at nodes
//! whose children are already canonical, so one pass reaches the fixpoint.
//!
//! - Nop children of groups are dropped. An empty group becomes Nop, a group
//!   of one becomes its child (a parallel join of one becomes
//!   `Parallel(child)`).
//! - Nested sequences are flattened, nested joins too when they share the
//!   same scheduling mode.
//! - A `Parallel` child of a multi-child sequence is replaced by its inner
//!   action.
//! - `Parallel(Parallel(a))` and `Parallel(Shared(a))` drop the outer layer.
//! - `Timeout(d1, Timeout(d2, a))` keeps the tighter deadline.
//! - `Shared` unwraps a `Parallel` or `Shared` inner.
//! - Every decorator around Nop is Nop.
//!
//! A shared action that appears in several branches is rewritten once and
//! every occurrence points at the same result, so it still runs at most
//! once.

use std::collections::HashMap;

use crate::action::Action;
use crate::join::{Join, JoinMode};
use crate::parallel::{parallel, Parallel};
use crate::retry::Retry;
use crate::sequential::Sequential;
use crate::shared::Shared;
use crate::timeout::Timeout;

/// Rewrite `workflow` into its canonical form.
pub fn optimize_workflow(workflow: Action) -> Action {
    Optimizer::default().optimize(workflow)
}

#[derive(Default)]
struct Optimizer {
    shared: HashMap<usize, Action>,
}

impl Optimizer {
    fn optimize(&mut self, act: Action) -> Action {
        match act {
            Action::Nop | Action::Leaf(_) => act,
            Action::Sequential(seq) => self.sequential(seq),
            Action::Join(join) => self.join(join),
            Action::Parallel(Parallel { inner }) => collapse_parallel(self.optimize(*inner)),
            Action::Timeout(t) => match self.optimize(*t.inner) {
                Action::Nop => Action::Nop,
                Action::Timeout(inner) => Action::Timeout(Timeout {
                    timeout: t.timeout.min(inner.timeout),
                    inner: inner.inner,
                }),
                inner => Action::Timeout(Timeout {
                    timeout: t.timeout,
                    inner: Box::new(inner),
                }),
            },
            Action::Retry(r) => match self.optimize(*r.inner) {
                Action::Nop => Action::Nop,
                inner => Action::Retry(Retry {
                    limit: r.limit,
                    interval: r.interval,
                    inner: Box::new(inner),
                }),
            },
            Action::Shared(shared) => self.shared(shared),
        }
    }

    fn sequential(&mut self, seq: Sequential) -> Action {
        let mut children = Vec::with_capacity(seq.children.len());
        for child in seq.children {
            match self.optimize(child) {
                Action::Nop => {}
                Action::Sequential(inner) => children.extend(inner.children),
                other => children.push(other),
            }
        }

        if children.len() <= 1 {
            return children.pop().unwrap_or_default();
        }

        let mut unwrapped = Vec::with_capacity(children.len());
        for child in children {
            match child {
                Action::Parallel(p) => match *p.inner {
                    Action::Sequential(inner) => unwrapped.extend(inner.children),
                    inner => unwrapped.push(inner),
                },
                other => unwrapped.push(other),
            }
        }
        Action::Sequential(Sequential {
            children: unwrapped,
        })
    }

    fn join(&mut self, join: Join) -> Action {
        let mode = join.mode;
        let mut children = Vec::with_capacity(join.children.len());
        for child in join.children {
            match self.optimize(child) {
                Action::Nop => {}
                Action::Join(inner) if inner.mode == mode => children.extend(inner.children),
                other => children.push(other),
            }
        }

        match (children.len(), mode) {
            (0, _) => Action::Nop,
            (1, JoinMode::Parallel) => collapse_parallel(children.swap_remove(0)),
            (1, JoinMode::Sequential) => children.swap_remove(0),
            _ => Action::Join(Join { mode, children }),
        }
    }

    fn shared(&mut self, shared: Shared) -> Action {
        // A latch that already fired keeps its outcome.
        if shared.is_done() {
            return Action::Shared(shared);
        }
        let key = shared.key();
        if let Some(done) = self.shared.get(&key) {
            return done.clone();
        }

        let optimized = match self.optimize(shared.inner().clone()) {
            Action::Nop => Action::Nop,
            Action::Parallel(p) => Action::Shared(Shared::from_inner(*p.inner)),
            inner @ Action::Shared(_) => inner,
            inner => Action::Shared(Shared::from_inner(inner)),
        };
        self.shared.insert(key, optimized.clone());
        optimized
    }
}

/// `Parallel(inner)` for an inner action that is already canonical.
fn collapse_parallel(inner: Action) -> Action {
    match inner {
        Action::Nop => Action::Nop,
        Action::Parallel(_) | Action::Shared(_) => inner,
        other => parallel(other),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use std::num::NonZeroU32;
    use std::time::Duration;

    use super::*;
    use crate::action::{new_action, nop};
    use crate::join::{join, ordered_join, parallel_join};
    use crate::result::proceed;
    use crate::retry::retry;
    use crate::sequential::sequential;
    use crate::shared::shared;
    use crate::timeout::timeout;

    fn leaf(name: &str) -> Action {
        new_action(name, |_| async { proceed() })
    }

    fn seq(actions: impl IntoIterator<Item = Action>) -> Action {
        sequential(actions).unwrap()
    }

    fn check(input: Action, expected: &str) {
        let optimized = optimize_workflow(input);
        assert_eq!(optimized.describe(), expected);
        assert_eq!(optimize_workflow(optimized).describe(), expected);
    }

    #[test]
    fn test_nop_absorption() {
        check(seq([nop(), leaf("A"), nop()]), "A");
        check(ordered_join([nop(), leaf("A"), nop()]), "A");
        check(parallel_join([nop(), leaf("A"), nop()]), "Parallel(A)");
        check(seq([nop(), parallel(nop()), ordered_join([nop(), nop()])]), "Nop");
    }

    #[test]
    fn test_flatten() {
        check(
            seq([seq([leaf("A"), leaf("B")]), leaf("C"), seq([leaf("D")])]),
            "Sequential(A, B, C, D)",
        );
        check(
            ordered_join([ordered_join([leaf("A"), leaf("B")]), leaf("C")]),
            "Join(A, B, C)",
        );
        check(
            parallel_join([parallel_join([leaf("A"), leaf("B")]), leaf("C")]),
            "ParallelJoin(A, B, C)",
        );
    }

    #[test]
    fn test_joins_of_different_modes_stay_nested() {
        check(
            ordered_join([parallel_join([leaf("A"), leaf("B")]), leaf("C")]),
            "Join(ParallelJoin(A, B), C)",
        );
    }

    #[test]
    fn test_parallel_inside_sequence_is_unwrapped() {
        check(
            seq([parallel(leaf("A")), leaf("B")]),
            "Sequential(A, B)",
        );
        check(
            seq([parallel(seq([leaf("A"), leaf("B")])), leaf("C")]),
            "Sequential(A, B, C)",
        );
        check(seq([parallel(leaf("A"))]), "Parallel(A)");
    }

    #[test]
    fn test_nested_decorators() {
        check(parallel(parallel(leaf("A"))), "Parallel(A)");
        check(parallel(shared(leaf("A"))), "Shared(A)");
        check(shared(parallel(leaf("A"))), "Shared(A)");
        check(
            timeout(
                Duration::from_secs(5),
                timeout(Duration::from_secs(1), leaf("A")),
            ),
            "Timeout(A, timeout=1s)",
        );
        check(
            timeout(
                Duration::from_secs(1),
                timeout(Duration::from_secs(5), leaf("A")),
            ),
            "Timeout(A, timeout=1s)",
        );
    }

    #[test]
    fn test_dead_decorators() {
        let limit = NonZeroU32::new(3).unwrap();
        check(retry(limit, nop()), "Nop");
        check(parallel(nop()), "Nop");
        check(timeout(Duration::from_secs(1), nop()), "Nop");
        check(shared(nop()), "Nop");
        check(retry(limit, seq([nop()])), "Nop");
    }

    #[test]
    fn test_shared_identity_survives() {
        let sync = shared(seq([nop(), leaf("A"), leaf("B")]));
        let workflow = join([
            seq([leaf("X"), sync.clone()]),
            seq([leaf("Y"), sync.clone()]),
        ]);

        let optimized = optimize_workflow(workflow);
        let mut keys = Vec::new();
        collect_shared_keys(&optimized, &mut keys);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0], keys[1]);
    }

    fn collect_shared_keys(act: &Action, keys: &mut Vec<usize>) {
        if let Action::Shared(s) = act {
            keys.push(s.key());
        }
        for child in act.children() {
            collect_shared_keys(child, keys);
        }
    }
}
