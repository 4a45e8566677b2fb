//! Error types for the session engine.
//!
//! [`SessionError`] is the error type returned by the public session API and
//! handed to the error handler for pump-terminal failures. Transport-level
//! detail lives in [`crate::transport::TransportError`].

use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced by session operations and pump failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A write was attempted on a session that is already closed.
    #[error("session is closed")]
    Closed,

    /// A close was attempted on a session that is already closed.
    #[error("session is already closed")]
    AlreadyClosed,

    /// The outbound queue is at capacity and the backpressure policy rejects
    /// rather than blocks.
    #[error("outbound queue is full")]
    QueueFull,

    /// A transport read failed, including read-deadline expiry.
    #[error("transport read failed: {0}")]
    Read(#[source] TransportError),

    /// A transport write failed, including write-deadline expiry.
    #[error("transport write failed: {0}")]
    Write(#[source] TransportError),
}

/// Convenience type alias for session results.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_display() {
        assert_eq!(SessionError::Closed.to_string(), "session is closed");
    }

    #[test]
    fn already_closed_display() {
        assert_eq!(
            SessionError::AlreadyClosed.to_string(),
            "session is already closed"
        );
    }

    #[test]
    fn queue_full_display() {
        assert_eq!(SessionError::QueueFull.to_string(), "outbound queue is full");
    }

    #[test]
    fn read_error_includes_cause() {
        let err = SessionError::Read(TransportError::DeadlineExceeded);
        assert_eq!(
            err.to_string(),
            "transport read failed: deadline exceeded"
        );
    }

    #[test]
    fn write_error_includes_cause() {
        let err = SessionError::Write(TransportError::ConnectionClosed);
        assert_eq!(
            err.to_string(),
            "transport write failed: connection closed"
        );
    }

    #[test]
    fn source_is_preserved() {
        use std::error::Error as _;
        let err = SessionError::Write(TransportError::DeadlineExceeded);
        assert!(err.source().is_some());
        assert!(SessionError::Closed.source().is_none());
    }
}
