//! # Error Taxonomy
//!
//! Every fallible operation in the crate reports one of these variants. The
//! variant tells the caller how to react: connection problems are retried by
//! the session itself, protocol problems only cost the offending frame,
//! timeouts and validation/state problems are returned to whoever asked.

use thiserror::Error;

/// Errors produced by the feed client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// The transport is unreachable, dropped, or refused a frame.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A frame could not be decoded or did not have the expected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server did not confirm in time.
    #[error("Timed out after {secs}s waiting for {waiting_for}")]
    Timeout {
        /// What the caller was waiting for.
        waiting_for: &'static str,
        /// The bound that elapsed, in whole seconds.
        secs: u64,
    },

    /// A user command was malformed or referenced something that does not exist.
    #[error("{0}")]
    Validation(String),

    /// The operation is not possible in the current session state.
    #[error("Invalid state: {0}")]
    State(String),

    /// The session was closed while the operation was waiting.
    #[error("Session is shutting down")]
    Shutdown,
}

/// Result alias used across the crate.
pub type FeedResult<T> = Result<T, FeedError>;

impl FeedError {
    /// Builds a [`FeedError::Timeout`] from a `Duration`, rounding up to whole seconds.
    pub fn timeout(waiting_for: &'static str, after: std::time::Duration) -> Self {
        let secs = after.as_secs() + u64::from(after.subsec_nanos() > 0);
        FeedError::Timeout { waiting_for, secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_rounds_up_partial_seconds() {
        let err = FeedError::timeout("selection confirmation", Duration::from_millis(300));
        assert_eq!(
            err,
            FeedError::Timeout { waiting_for: "selection confirmation", secs: 1 }
        );
        assert_eq!(
            err.to_string(),
            "Timed out after 1s waiting for selection confirmation"
        );
    }

    #[test]
    fn test_validation_message_is_shown_verbatim() {
        let err = FeedError::Validation("Index 7 is out of range (1-3)".to_string());
        assert_eq!(err.to_string(), "Index 7 is out of range (1-3)");
    }
}
