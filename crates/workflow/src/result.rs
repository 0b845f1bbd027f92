//! The outcome of running an action and the rules for combining outcomes.
//!
//! An [`ActionResult`] carries three orthogonal signals: an immediate
//! requeue request, a timed requeue request and an optional error. Joins
//! fold sibling results with [`join_result`], which is commutative and
//! associative.

use std::time::Duration;

use crate::error::{Error, MultiError};

/// Outcome of an action.
#[derive(Debug, Clone, Default)]
pub struct ActionResult {
    /// Request another reconcile as soon as possible.
    pub requeue: bool,
    /// Request another reconcile no sooner than this. Zero means unset.
    pub requeue_after: Duration,
    /// The error, if any.
    pub error: Option<Error>,
}

impl ActionResult {
    /// A result carrying only an error.
    pub fn from_error(err: impl Into<Error>) -> Self {
        Self {
            error: Some(err.into()),
            ..Self::default()
        }
    }

    /// Check if this result asks for another reconcile.
    pub fn needs_requeue(&self) -> bool {
        needs_requeue(self)
    }

    /// Check if the error is the exit sentinel.
    pub fn is_exit(&self) -> bool {
        self.error.as_ref().is_some_and(Error::is_exit)
    }

    /// Check if the error is set and is not the exit sentinel.
    pub fn is_failure(&self) -> bool {
        self.error.as_ref().is_some_and(|e| !e.is_exit())
    }

    /// Timed requeue, `None` when unset.
    pub fn requeue_after(&self) -> Option<Duration> {
        (!self.requeue_after.is_zero()).then_some(self.requeue_after)
    }

    /// Fold another result into this one.
    #[must_use]
    pub fn join(self, other: ActionResult) -> Self {
        join_result(self, other)
    }
}

/// Reports whether the result asks for another reconcile: an error, an
/// immediate requeue or a positive requeue-after.
pub fn needs_requeue(result: &ActionResult) -> bool {
    result.error.is_some() || result.requeue || !result.requeue_after.is_zero()
}

/// Join two errors.
///
/// - any + none = any
/// - exit + exit = exit
/// - err + exit = err
/// - err1 + err2 = [err1, err2]
pub fn join_error(first: Option<Error>, second: Option<Error>) -> Option<Error> {
    match (first, second) {
        (None, err) | (err, None) => err,
        (Some(Error::Exit), Some(err)) | (Some(err), Some(Error::Exit)) => Some(err),
        (Some(first), Some(second)) => Some(Error::Multi(MultiError::pair(first, second))),
    }
}

/// Join two results: requeue flags are OR-ed, the shorter positive
/// requeue-after wins and errors are joined with [`join_error`].
pub fn join_result(first: ActionResult, second: ActionResult) -> ActionResult {
    ActionResult {
        requeue: first.requeue || second.requeue,
        requeue_after: min_requeue_after(first.requeue_after, second.requeue_after),
        error: join_error(first.error, second.error),
    }
}

fn min_requeue_after(first: Duration, second: Duration) -> Duration {
    match (first.is_zero(), second.is_zero()) {
        (true, _) => second,
        (_, true) => first,
        _ => first.min(second),
    }
}

/// Join the result of a step that always runs after `main`, such as a
/// status write.
///
/// Requeue signals are joined as in [`join_result`]. A failure of `main`
/// wins over anything `trailing` reports; the error of `trailing` shows only
/// when `main` succeeded or exited.
pub fn join_trailing(main: ActionResult, trailing: ActionResult) -> ActionResult {
    let error = if main.is_failure() {
        main.error
    } else {
        join_error(main.error, trailing.error)
    };
    ActionResult {
        requeue: main.requeue || trailing.requeue,
        requeue_after: min_requeue_after(main.requeue_after, trailing.requeue_after),
        error,
    }
}

/// Clears the exit sentinel but keeps the requeue signals.
pub fn ignore_exit(result: ActionResult) -> ActionResult {
    if result.is_exit() {
        ActionResult {
            error: None,
            ..result
        }
    } else {
        result
    }
}

/// An empty result.
pub fn no_requeue() -> ActionResult {
    ActionResult::default()
}

/// Alias of [`no_requeue`], reads better in the middle of a sequence.
pub fn proceed() -> ActionResult {
    no_requeue()
}

/// A result asking for an immediate requeue.
pub fn requeue_immediately() -> ActionResult {
    ActionResult {
        requeue: true,
        ..ActionResult::default()
    }
}

/// A result asking for a requeue after the given duration.
pub fn requeue_after(after: Duration) -> ActionResult {
    ActionResult {
        requeue_after: after,
        ..ActionResult::default()
    }
}

/// An empty result carrying the error of `res`, if any.
pub fn requeue_if_error<T, E>(res: std::result::Result<T, E>) -> ActionResult
where
    E: Into<Error>,
{
    match res {
        Ok(_) => no_requeue(),
        Err(err) => ActionResult::from_error(err),
    }
}

/// Like [`requeue_if_error`], with `explain` prepended to the error.
pub fn requeue_if_error_and_wrap<T, E>(
    explain: impl Into<String>,
    res: std::result::Result<T, E>,
) -> ActionResult
where
    E: Into<Error>,
{
    match res {
        Ok(_) => no_requeue(),
        Err(err) => ActionResult::from_error(Error::wrap(explain, err)),
    }
}

/// An empty result carrying the exit sentinel.
pub fn exit() -> ActionResult {
    ActionResult::from_error(Error::Exit)
}

/// [`exit`] when `cond` holds, [`proceed`] otherwise.
pub fn exit_if(cond: bool) -> ActionResult {
    if cond {
        exit()
    } else {
        proceed()
    }
}
