//! Retry an action on failure.

use std::num::NonZeroU32;
use std::time::Duration;

use crate::action::Action;
use crate::context::Context;
use crate::error::{BuildError, Error, Result};
use crate::result::ActionResult;

/// Runs the inner action until it succeeds, exits or the attempt limit is
/// reached. With an interval, waits between attempts unless the context is
/// done first.
#[derive(Clone)]
pub struct Retry {
    pub(crate) limit: NonZeroU32,
    pub(crate) interval: Option<Duration>,
    pub(crate) inner: Box<Action>,
}

impl Retry {
    /// Maximum number of attempts.
    pub fn limit(&self) -> NonZeroU32 {
        self.limit
    }

    /// Pause between attempts, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// The wrapped action.
    pub fn inner(&self) -> &Action {
        &self.inner
    }

    pub(crate) fn describe(&self) -> String {
        match self.interval {
            Some(interval) => format!(
                "Retry({}, limit={}, interval={:?})",
                self.inner.describe(),
                self.limit,
                interval
            ),
            None => format!("Retry({}, limit={})", self.inner.describe(), self.limit),
        }
    }

    pub(crate) async fn run(&self, ctx: &Context) -> ActionResult {
        let mut attempt = 1;
        loop {
            let result = self.inner.run(ctx).await;
            if !result.is_failure() || attempt >= self.limit.get() {
                return result;
            }
            attempt += 1;

            tracing::debug!(
                parent: ctx.span(),
                action = %self.inner.name(),
                attempt,
                limit = self.limit.get(),
                "retrying action"
            );

            if let Some(interval) = self.interval {
                tokio::select! {
                    () = ctx.done() => {
                        return ActionResult::from_error(ctx.err().unwrap_or(Error::Cancelled));
                    }
                    () = tokio::time::sleep(interval) => {}
                }
            }
        }
    }
}

/// Wrap the action with up to `limit` attempts.
pub fn retry(limit: NonZeroU32, act: Action) -> Action {
    Action::Retry(Retry {
        limit,
        interval: None,
        inner: Box::new(act),
    })
}

/// Wrap the action with up to `limit` attempts, `interval` apart.
///
/// # Errors
///
/// Returns [`BuildError::ZeroRetryInterval`] when `interval` is zero.
pub fn retry_interval(limit: NonZeroU32, interval: Duration, act: Action) -> Result<Action> {
    if interval.is_zero() {
        return Err(BuildError::ZeroRetryInterval);
    }
    Ok(Action::Retry(Retry {
        limit,
        interval: Some(interval),
        inner: Box::new(act),
    }))
}
