//! Transport abstraction over a framed duplex connection.
//!
//! The engine never touches wire framing; it drives an implementation of
//! [`Transport`] — typically an adapter over a WebSocket library. The
//! session guarantees a strict usage discipline: the read pump is the sole
//! caller of [`Transport::read_message`], the write pump the sole caller of
//! [`Transport::write_message`], and [`Transport::close`] is invoked exactly
//! once by the close path.

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

use crate::envelope::Envelope;

/// Errors reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The underlying connection is closed (EOF, reset, or already shut
    /// down locally).
    #[error("connection closed")]
    ConnectionClosed,

    /// The active read or write deadline expired before the operation
    /// completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// An inbound message exceeded the configured read limit.
    #[error("message of {size} bytes exceeds the {limit} byte read limit")]
    MessageTooLarge {
        /// Size of the offending message.
        size: usize,
        /// Active read limit.
        limit: usize,
    },

    /// The peer violated the transport protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An I/O error from the underlying socket.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A framed duplex connection.
///
/// Methods take `&self`; implementations synchronize their read and write
/// halves internally. The session's pumps never contend — each half has
/// exactly one caller.
///
/// Deadline setters store an instant and cannot fail; a violated deadline
/// surfaces as [`TransportError::DeadlineExceeded`] from the pending read or
/// write. Inbound control frames (ping, pong, close) are surfaced as
/// [`Envelope`]s. Implementations are responsible for protocol-level ping
/// auto-replies and close handshakes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Read the next frame, honoring the active read deadline and limit.
    async fn read_message(&self) -> Result<Envelope, TransportError>;

    /// Write one frame, honoring the active write deadline.
    async fn write_message(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Set the deadline for subsequent (and pending) reads.
    fn set_read_deadline(&self, deadline: Instant);

    /// Set the deadline for subsequent writes.
    fn set_write_deadline(&self, deadline: Instant);

    /// Set the maximum accepted inbound message size in bytes.
    fn set_read_limit(&self, limit: usize);

    /// Close the underlying connection.
    async fn close(&self) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn read_message(&self) -> Result<Envelope, TransportError> {
        (**self).read_message().await
    }

    async fn write_message(&self, envelope: &Envelope) -> Result<(), TransportError> {
        (**self).write_message(envelope).await
    }

    fn set_read_deadline(&self, deadline: Instant) {
        (**self).set_read_deadline(deadline);
    }

    fn set_write_deadline(&self, deadline: Instant) {
        (**self).set_write_deadline(deadline);
    }

    fn set_read_limit(&self, limit: usize) {
        (**self).set_read_limit(limit);
    }

    async fn close(&self) -> Result<(), TransportError> {
        (**self).close().await
    }
}
