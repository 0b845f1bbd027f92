//! End-to-end behavior of workflows built from the public combinators.
//!
//! Each test builds a small workflow the way a reconciler would, runs it
//! under a real runtime and checks the folded [`ActionResult`].

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rwo_workflow::{
    exit_if, ignore_exit, join, join_trailing, new_action, nop, optimize_workflow, ordered_join,
    parallel, parallel_join, proceed, requeue_after, retry, retry_interval, sequential, shared,
    timeout, Action, ActionResult, Context, Error,
};

// =============================================================================
// Fixtures
// =============================================================================

fn leaf(name: &str) -> Action {
    new_action(name, |_| async { proceed() })
}

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

fn boom() -> ActionResult {
    panic!("boom")
}

fn limit(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap()
}

// =============================================================================
// Optimizer
// =============================================================================

/// GIVEN a sequence made only of dead nodes
/// WHEN it is optimized twice
/// THEN both passes return Nop
#[test]
fn optimizer_reduces_dead_tree_to_nop() {
    let workflow = sequential([
        nop(),
        parallel(nop()),
        ordered_join([nop(), nop()]),
    ])
    .unwrap();

    let once = optimize_workflow(workflow);
    assert!(once.is_nop());
    assert!(optimize_workflow(once).is_nop());
}

/// GIVEN nested timeouts of 5s and 1s
/// WHEN the optimized workflow runs
/// THEN the leaf sees the 1s deadline
#[tokio::test]
async fn optimized_timeout_uses_tighter_deadline() {
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let s = seen.clone();
    let workflow = timeout(
        Duration::from_secs(5),
        timeout(
            Duration::from_secs(1),
            new_action("A", move |ctx: Context| {
                let s = s.clone();
                async move {
                    *s.lock() = ctx.remaining();
                    proceed()
                }
            }),
        ),
    );

    let optimized = optimize_workflow(workflow);
    assert_eq!(optimized.describe(), "Timeout(A, timeout=1s)");

    optimized.run(&Context::background()).await;
    let remaining = seen.lock().take().unwrap();
    assert!(remaining <= Duration::from_secs(1));
}

// =============================================================================
// Sequential
// =============================================================================

/// GIVEN a sequence whose first leaf asks for a requeue in 2s
/// WHEN it runs
/// THEN the second leaf never runs and the result is passed through
#[tokio::test]
async fn sequence_short_circuits_on_requeue_after() {
    let counter = Arc::new(AtomicUsize::new(0));
    let workflow = sequential([
        new_action("A", |_| async { requeue_after(Duration::from_secs(2)) }),
        counting("B", &counter, proceed()),
    ])
    .unwrap();

    let r = workflow.run(&Context::background()).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(r.requeue_after, Duration::from_secs(2));
    assert!(!r.requeue);
    assert!(r.error.is_none());
}

/// GIVEN a state-machine barrier that is not satisfied
/// WHEN the surrounding sequence runs and the exit is ignored
/// THEN the steps after the barrier are skipped and no error remains
#[tokio::test]
async fn barrier_stops_sequence_without_failure() {
    let counter = Arc::new(AtomicUsize::new(0));
    let meta_ready = false;
    let workflow = sequential([
        counting("SyncMetaService", &counter, proceed()),
        new_action("BarrierMetaReady", move |_| async move { exit_if(!meta_ready) }),
        counting("SyncFrontendService", &counter, proceed()),
    ])
    .unwrap();

    let r = workflow.run(&Context::background()).await;
    assert!(r.is_exit());
    assert!(!ignore_exit(r).needs_requeue());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Join
// =============================================================================

/// GIVEN a parallel join of an exit and a 1s requeue
/// WHEN it runs
/// THEN the exit is dominated and only the requeue remains
#[tokio::test]
async fn parallel_join_exit_and_requeue() {
    let workflow = parallel_join([
        new_action("Exit", |_| async { exit_if(true) }),
        new_action("RequeueAfter", |_| async { requeue_after(Duration::from_secs(1)) }),
    ]);

    let r = workflow.run(&Context::background()).await;
    assert!(!r.requeue);
    assert_eq!(r.requeue_after, Duration::from_secs(1));
    assert!(r.error.is_none());
}

/// GIVEN a parallel join where one child fails
/// WHEN it runs
/// THEN every sibling still runs to completion
#[tokio::test]
async fn parallel_join_does_not_cancel_siblings() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    let workflow = parallel_join([
        new_action("Fail", |_| async { ActionResult::from_error("fail") }),
        new_action("Slow", move |_| {
            let c = c.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                c.fetch_add(1, Ordering::SeqCst);
                proceed()
            }
        }),
    ]);

    let r = workflow.run(&Context::background()).await;
    assert!(r.is_failure());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

/// Run `main`, then `update` whatever `main` returned.
async fn run_then_update(main: &Action, update: &Action) -> ActionResult {
    let ctx = Context::background();
    let result = main.run(&ctx).await;
    join_trailing(result, update.run(&ctx).await)
}

/// GIVEN a status update that trails the main workflow
/// WHEN the main workflow fails
/// THEN the status update still runs and the main error is reported
#[tokio::test]
async fn status_update_runs_after_failed_workflow() {
    let updates = Arc::new(AtomicUsize::new(0));
    let main = new_action("Main", |_| async { ActionResult::from_error("main failed") });
    let update = counting("UpdateStatus", &updates, proceed());

    let r = run_then_update(&main, &update).await;
    assert_eq!(updates.load(Ordering::SeqCst), 1);
    assert_eq!(r.error.map(|e| e.to_string()), Some("main failed".to_string()));
}

/// GIVEN a status update that trails the main workflow
/// WHEN both fail
/// THEN only the main error is reported and the requeue signals are joined
#[tokio::test]
async fn main_failure_wins_over_status_failure() {
    let main = new_action("Main", |_| async { ActionResult::from_error("main failed") });
    let update = new_action("UpdateStatus", |_| async {
        ActionResult {
            requeue: true,
            ..ActionResult::from_error("status failed")
        }
    });

    let r = run_then_update(&main, &update).await;
    assert_eq!(r.error.map(|e| e.to_string()), Some("main failed".to_string()));
    assert!(r.requeue);
}

/// GIVEN a status update that trails the main workflow
/// WHEN the main workflow exits and the status update fails
/// THEN the status error is reported
#[tokio::test]
async fn status_failure_shows_after_exit() {
    let main = new_action("Main", |_| async { exit_if(true) });
    let update = new_action("UpdateStatus", |_| async {
        ActionResult::from_error("status failed")
    });

    let r = ignore_exit(run_then_update(&main, &update).await);
    assert_eq!(r.error.map(|e| e.to_string()), Some("status failed".to_string()));
}

// =============================================================================
// Retry
// =============================================================================

/// GIVEN a leaf that always fails
/// WHEN it is retried with a limit of 4
/// THEN it runs exactly four times
#[tokio::test]
async fn retry_runs_exactly_limit_times() {
    let counter = Arc::new(AtomicUsize::new(0));
    let workflow = retry(limit(4), counting("A", &counter, ActionResult::from_error("e")));

    let r = workflow.run(&Context::background()).await;
    assert!(r.is_failure());
    assert_eq!(counter.load(Ordering::SeqCst), 4);
}

/// GIVEN a leaf that exits
/// WHEN it is retried
/// THEN it runs once and the exit is visible
#[tokio::test]
async fn retry_stops_on_exit() {
    let counter = Arc::new(AtomicUsize::new(0));
    let workflow = retry(limit(4), counting("A", &counter, exit_if(true)));

    let r = workflow.run(&Context::background()).await;
    assert!(r.is_exit());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

/// GIVEN a failing leaf retried every 5s
/// WHEN the context is cancelled 10ms in
/// THEN the context error is returned after a single attempt
#[tokio::test]
async fn retry_interval_respects_cancellation() {
    let counter = Arc::new(AtomicUsize::new(0));
    let workflow = retry_interval(
        limit(10),
        Duration::from_secs(5),
        counting("A", &counter, ActionResult::from_error("e")),
    )
    .unwrap();

    let (ctx, cancel) = Context::background().with_cancel();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();
    });

    let r = workflow.run(&ctx).await;
    assert!(matches!(r.error, Some(Error::Cancelled)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Shared
// =============================================================================

/// GIVEN a shared leaf that counts its runs
/// WHEN many tasks run it concurrently
/// THEN it runs once and every caller sees the same result
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shared_runs_once_under_concurrency() {
    let counter = Arc::new(AtomicUsize::new(0));
    let c = counter.clone();
    let workflow = shared(new_action("SyncAllAndWait", move |_| {
        let c = c.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c.fetch_add(1, Ordering::SeqCst);
            requeue_after(Duration::from_secs(3))
        }
    }));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let act = workflow.clone();
            tokio::spawn(async move { act.run(&Context::background()).await })
        })
        .collect();

    for handle in handles {
        let r = handle.await.unwrap();
        assert_eq!(r.requeue_after, Duration::from_secs(3));
        assert!(r.error.is_none());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

/// GIVEN a shared leaf that panics
/// WHEN two tasks run it concurrently
/// THEN both observe a panic carrying "boom"
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shared_panic_reaches_every_caller() {
    let workflow = shared(new_action("Boom", |_| async { boom() }));

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let act = workflow.clone();
            tokio::spawn(async move { act.run(&Context::background()).await })
        })
        .collect();

    for handle in handles {
        let err = handle.await.err().unwrap();
        assert!(err.is_panic());
        let payload = err.into_panic();
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("boom"));
    }
}

/// GIVEN a shared action referenced from two join branches
/// WHEN the optimized workflow runs
/// THEN the shared action still runs once
#[tokio::test]
async fn shared_survives_optimization() {
    let counter = Arc::new(AtomicUsize::new(0));
    let sync = shared(sequential([nop(), counting("Sync", &counter, proceed())]).unwrap());
    let workflow = parallel_join([
        sequential([leaf("MarkRunning"), sync.clone()]).unwrap(),
        sequential([leaf("MarkUpgrading"), sync]).unwrap(),
    ]);

    let r = optimize_workflow(workflow)
        .run(&Context::background())
        .await;
    assert!(!r.needs_requeue());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Describe
// =============================================================================

/// GIVEN a workflow with a group, a join and a timeout
/// WHEN it is described
/// THEN every leaf appears once along with the decorator options
#[test]
fn describe_mentions_every_leaf_once() {
    let workflow = sequential([
        leaf("A"),
        join([leaf("B"), leaf("C")]),
        timeout(Duration::from_secs(3), leaf("D")),
    ])
    .unwrap();

    let description = workflow.describe();
    for name in ["A", "B", "C", "D"] {
        assert_eq!(description.matches(name).count(), 1, "{description}");
    }
    assert!(description.contains("Timeout"));
    assert!(description.contains("3s"));
    assert!(description.contains("Join("));
    assert!(!description.contains("ParallelJoin"));

    let parallel = parallel_join([leaf("B"), leaf("C")]);
    assert!(parallel.describe().starts_with("ParallelJoin("));
}
