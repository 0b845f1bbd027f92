//! Error types for the workflow crate.
//!
//! [`Error`] is what an action reports when it fails or exits early. It is
//! `Clone` because a [`Shared`](crate::Shared) action hands the very same
//! outcome to every caller. [`BuildError`] covers workflows that cannot be
//! constructed at all.

use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use thiserror::Error;

/// Result type alias for workflow construction.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Error carried by an [`ActionResult`](crate::ActionResult).
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Cooperative short-circuit. Not a failure: it only stops the
    /// surrounding sequence.
    #[error("exit")]
    Exit,

    /// Errors of sibling actions joined together.
    #[error("{0}")]
    Multi(MultiError),

    /// An error with an explanation prepended.
    #[error("{explain}: {source}")]
    Wrapped {
        explain: String,
        #[source]
        source: Box<Error>,
    },

    /// The context was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// A spawned task was aborted before it could report a result.
    #[error("task aborted")]
    TaskAborted,

    /// Plain message.
    #[error("{0}")]
    Message(String),

    /// Any other error.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Create an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap an arbitrary error.
    pub fn other(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Arc::new(err))
    }

    /// Prepend an explanation to an error.
    pub fn wrap(explain: impl Into<String>, source: impl Into<Error>) -> Self {
        Self::Wrapped {
            explain: explain.into(),
            source: Box::new(source.into()),
        }
    }

    /// Check if this is the exit sentinel.
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit)
    }

    /// Check if this error comes from the context.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Flatten into the list of underlying errors. A multi-error yields its
    /// constituents, anything else yields itself.
    pub fn into_errors(self) -> Vec<Error> {
        match self {
            Self::Multi(multi) => multi.errors,
            other => vec![other],
        }
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<MultiError> for Error {
    fn from(multi: MultiError) -> Self {
        Self::Multi(multi)
    }
}

impl From<BuildError> for Error {
    fn from(err: BuildError) -> Self {
        Self::other(err)
    }
}

/// Aggregation of sibling errors produced by a join.
///
/// Each constituent is kept as-is; they are rendered into one string only
/// when displayed.
#[derive(Debug, Clone, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    /// Create an empty multi-error.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error, flattening nested multi-errors.
    pub fn push(&mut self, err: Error) {
        match err {
            Error::Multi(multi) => self.errors.extend(multi.errors),
            other => self.errors.push(other),
        }
    }

    /// Join two errors into one multi-error.
    pub fn pair(first: Error, second: Error) -> Self {
        let mut multi = Self::new();
        multi.push(first);
        multi.push(second);
        multi
    }

    /// The underlying errors.
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Number of underlying errors.
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Check if there are no underlying errors.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors.iter().join("; "))
    }
}

impl std::error::Error for MultiError {}

impl IntoIterator for MultiError {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

/// Errors raised while building a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A group that requires children was given none.
    #[error("{group} requires at least one action")]
    EmptyGroup { group: &'static str },

    /// A retry interval must be positive.
    #[error("retry interval must be positive")]
    ZeroRetryInterval,
}

impl BuildError {
    /// Create an empty group error.
    pub fn empty_group(group: &'static str) -> Self {
        Self::EmptyGroup { group }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_display() {
        assert_eq!(Error::Exit.to_string(), "exit");
        assert!(Error::Exit.is_exit());
        assert!(!Error::msg("exit").is_exit());
    }

    #[test]
    fn test_wrap_display() {
        let err = Error::wrap("unable to update status", "conflict");
        assert_eq!(err.to_string(), "unable to update status: conflict");
    }

    #[test]
    fn test_multi_error_flattens() {
        let inner = MultiError::pair(Error::msg("a"), Error::msg("b"));
        let mut outer = MultiError::new();
        outer.push(Error::Multi(inner));
        outer.push(Error::msg("c"));

        assert_eq!(outer.len(), 3);
        assert_eq!(outer.to_string(), "a; b; c");
    }

    #[test]
    fn test_into_errors() {
        let multi = Error::Multi(MultiError::pair(Error::msg("a"), Error::Cancelled));
        let errors = multi.into_errors();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(Error::is_context_error));

        assert_eq!(Error::msg("x").into_errors().len(), 1);
    }

    #[test]
    fn test_build_error_display() {
        let err = BuildError::empty_group("Sequential");
        assert!(err.to_string().contains("Sequential"));
    }
}
