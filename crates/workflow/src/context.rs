//! Execution context passed to every action.
//!
//! A [`Context`] carries cooperative cancellation, an optional deadline and
//! the tracing span actions should log under. Contexts form a tree:
//! cancelling a parent cancels every child, and a child deadline can only
//! be tighter than its parent's.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::Span;

use crate::error::Error;

/// Cancellation, deadline and logging scope for a run.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    span: Span,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            span: Span::current(),
        }
    }

    /// Replace the span actions log under.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Derive a child context together with the token that cancels it.
    pub fn with_cancel(&self) -> (Self, CancellationToken) {
        let token = self.token.child_token();
        let child = Self {
            token: token.clone(),
            deadline: self.deadline,
            span: self.span.clone(),
        };
        (child, token)
    }

    /// Derive a child context that expires after `timeout`.
    ///
    /// The child is cancelled when the returned guard is dropped.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, DropGuard) {
        let token = self.token.child_token();
        let deadline = Instant::now()
            .checked_add(timeout)
            .map(|at| self.deadline.map_or(at, |parent| parent.min(at)))
            .or(self.deadline);
        let child = Self {
            token: token.clone(),
            deadline,
            span: self.span.clone(),
        };
        (child, token.drop_guard())
    }

    /// The instant this context expires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, if any.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Check if the context is cancelled or expired.
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolves once the context is cancelled or expired.
    pub async fn done(&self) {
        match self.deadline {
            Some(at) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(at) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Why the context is done, `None` while it is still live.
    pub fn err(&self) -> Option<Error> {
        if self.token.is_cancelled() {
            Some(Error::Cancelled)
        } else if self.deadline.is_some_and(|at| at <= Instant::now()) {
            Some(Error::DeadlineExceeded)
        } else {
            None
        }
    }

    /// The span actions should log under.
    pub fn span(&self) -> &Span {
        &self.span
    }
}
