//! Session state machine, public write/close API, and the idempotent close
//! path.
//!
//! A session owns exactly one transport and runs exactly two pumps: the
//! read pump is the sole transport reader, the write pump the sole
//! writer. External callers never touch the transport — they enqueue
//! envelopes or inspect the closed flag. The open → closed transition
//! happens exactly once, inside one critical section that also closes the
//! outbound queue, and the winner of that transition is the only caller of
//! the transport's close.

pub(crate) mod read_pump;
pub(crate) mod write_pump;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::attributes::Attributes;
use crate::config::{BackpressurePolicy, SessionConfig};
use crate::envelope::Envelope;
use crate::errors::{Result, SessionError};
use crate::handlers::Handlers;
use crate::transport::Transport;

/// One live duplex connection: state machine, outbound queue, and the
/// resources both pumps share.
///
/// Sessions are created by a [`crate::Hub`] when it accepts a transport and
/// are handed to application code through handler callbacks. All methods
/// are safe to call concurrently with each other and with an in-progress
/// internal close.
pub struct Session {
    id: Uuid,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: SessionConfig,
    pub(crate) handlers: Arc<Handlers>,
    /// Producer side of the outbound queue. Taken (and thereby closed)
    /// exactly when the session transitions to closed.
    pub(crate) outbound: Mutex<Option<mpsc::Sender<Envelope>>>,
    closed: AtomicBool,
    /// Critical section for the open → closed transition and the one-time
    /// transport close.
    close_gate: tokio::sync::Mutex<()>,
    /// Releases the read pump on teardown.
    pub(crate) shutdown: CancellationToken,
    attributes: Attributes,
}

impl Session {
    /// Create a session in the open state together with the consumer side
    /// of its outbound queue (owned by the write pump).
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        config: SessionConfig,
        handlers: Arc<Handlers>,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(config.message_buffer_size);
        let session = Arc::new(Self {
            id: Uuid::now_v7(),
            transport,
            config,
            handlers,
            outbound: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
            close_gate: tokio::sync::Mutex::new(()),
            shutdown: CancellationToken::new(),
            attributes: Attributes::new(),
        });
        (session, rx)
    }

    /// Unique session identity.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the session has transitioned to closed. Lock-free.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Per-session key/value storage.
    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Enqueue a text message.
    ///
    /// Fails with [`SessionError::Closed`] once the session is closed. A
    /// full queue blocks or rejects according to the configured
    /// backpressure policy.
    pub async fn write(self: &Arc<Self>, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(Envelope::text(payload)).await
    }

    /// Enqueue a binary message. Same contract as [`Session::write`].
    pub async fn write_binary(self: &Arc<Self>, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue(Envelope::binary(payload)).await
    }

    /// Request a graceful close with an empty close frame.
    ///
    /// Teardown happens asynchronously when the write pump dequeues the
    /// close envelope; messages enqueued before this call are still
    /// delivered first. Fails with [`SessionError::AlreadyClosed`] if the
    /// session is already closed.
    pub async fn close(self: &Arc<Self>) -> Result<()> {
        self.enqueue_close(Envelope::close()).await
    }

    /// Request a graceful close carrying a close-frame payload, usually
    /// built with [`crate::format_close_message`]. Same contract as
    /// [`Session::close`].
    pub async fn close_with_msg(self: &Arc<Self>, payload: impl Into<Bytes>) -> Result<()> {
        self.enqueue_close(Envelope::close_with(payload)).await
    }

    /// Forcibly disconnect: immediate teardown without a queued close
    /// frame. Pending outbound messages are dropped. Idempotent.
    pub async fn disconnect(&self) {
        self.teardown().await;
    }

    /// Enqueue an envelope under the configured backpressure policy.
    pub(crate) async fn enqueue(self: &Arc<Self>, envelope: Envelope) -> Result<()> {
        self.enqueue_with(envelope, self.config.backpressure).await
    }

    async fn enqueue_close(self: &Arc<Self>, envelope: Envelope) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::AlreadyClosed);
        }
        // Close envelopes are never dropped by backpressure; they queue
        // behind in-flight messages.
        match self.enqueue_with(envelope, BackpressurePolicy::Block).await {
            Err(SessionError::Closed) => Err(SessionError::AlreadyClosed),
            other => other,
        }
    }

    async fn enqueue_with(
        self: &Arc<Self>,
        envelope: Envelope,
        policy: BackpressurePolicy,
    ) -> Result<()> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let Some(tx) = self.outbound.lock().clone() else {
            self.report_closed_enqueue();
            return Err(SessionError::Closed);
        };
        match policy {
            BackpressurePolicy::Block => {
                if tx.send(envelope).await.is_err() {
                    self.report_closed_enqueue();
                    return Err(SessionError::Closed);
                }
            }
            BackpressurePolicy::Reject => match tx.try_send(envelope) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    return Err(SessionError::QueueFull);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.report_closed_enqueue();
                    return Err(SessionError::Closed);
                }
            },
        }
        Ok(())
    }

    /// An enqueue lost the race against the close path: recoverable,
    /// reported through the error handler rather than propagated as a
    /// crash.
    fn report_closed_enqueue(self: &Arc<Self>) {
        debug!(session_id = %self.id, "enqueue raced a concurrent close");
        self.handlers.dispatch_error(self, SessionError::Closed);
    }

    /// The idempotent close path.
    ///
    /// Exactly one caller wins the open → closed transition; that caller
    /// closes the outbound queue (future senders observe it as closed),
    /// releases the read pump, and performs the one-time transport close.
    /// Invoked by the write pump's terminal transition, the hub after the
    /// read pump returns, and forced disconnects.
    pub(crate) async fn teardown(&self) {
        let _gate = self.close_gate.lock().await;
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.outbound.lock().take();
        self.shutdown.cancel();
        if let Err(error) = self.transport.close().await {
            debug!(session_id = %self.id, %error, "transport close reported an error");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;
    use crate::envelope::FrameKind;
    use crate::testing::{make_session, make_session_with, MockTransport};

    #[tokio::test]
    async fn new_session_is_open() {
        let (session, _outbound, _transport, _remote) = make_session();
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn write_enqueues_text() {
        let (session, mut outbound, _transport, _remote) = make_session();
        session.write("hello").await.unwrap();
        let env = outbound.recv().await.unwrap();
        assert_eq!(env.kind(), FrameKind::Text);
        assert_eq!(env.payload().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn write_binary_enqueues_binary() {
        let (session, mut outbound, _transport, _remote) = make_session();
        session.write_binary(vec![1u8, 2, 3]).await.unwrap();
        let env = outbound.recv().await.unwrap();
        assert_eq!(env.kind(), FrameKind::Binary);
    }

    #[tokio::test]
    async fn writes_preserve_order() {
        let (session, mut outbound, _transport, _remote) = make_session();
        session.write("a").await.unwrap();
        session.write("b").await.unwrap();
        session.write("c").await.unwrap();
        for expected in [b"a", b"b", b"c"] {
            assert_eq!(outbound.recv().await.unwrap().payload().as_ref(), expected);
        }
    }

    #[tokio::test]
    async fn write_after_teardown_fails_closed() {
        let (session, _outbound, _transport, _remote) = make_session();
        session.teardown().await;
        assert!(matches!(
            session.write("late").await,
            Err(SessionError::Closed)
        ));
    }

    #[tokio::test]
    async fn close_enqueues_close_envelope() {
        let (session, mut outbound, _transport, _remote) = make_session();
        session.close().await.unwrap();
        assert_eq!(outbound.recv().await.unwrap().kind(), FrameKind::Close);
    }

    #[tokio::test]
    async fn close_after_teardown_is_already_closed() {
        let (session, _outbound, _transport, _remote) = make_session();
        session.teardown().await;
        assert!(matches!(
            session.close().await,
            Err(SessionError::AlreadyClosed)
        ));
        assert!(matches!(
            session.close_with_msg(Bytes::from_static(b"\x03\xe8")).await,
            Err(SessionError::AlreadyClosed)
        ));
    }

    #[tokio::test]
    async fn teardown_closes_transport_exactly_once() {
        let (session, _outbound, transport, _remote) = make_session();
        session.teardown().await;
        session.teardown().await;
        session.disconnect().await;
        assert_eq!(transport.close_calls(), 1);
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn teardown_closes_outbound_queue() {
        let (session, mut outbound, _transport, _remote) = make_session();
        session.write("before").await.unwrap();
        session.teardown().await;
        // buffered envelope still drains, then the queue reports closed
        assert!(outbound.recv().await.is_some());
        assert!(outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn reject_policy_reports_queue_full() {
        let config = SessionConfig {
            message_buffer_size: 1,
            backpressure: BackpressurePolicy::Reject,
            ..SessionConfig::default()
        };
        let (session, _outbound, _transport, _remote) =
            make_session_with(config, Arc::new(Handlers::default()));
        session.write("fits").await.unwrap();
        assert!(matches!(
            session.write("overflow").await,
            Err(SessionError::QueueFull)
        ));
    }

    #[tokio::test]
    async fn block_policy_waits_for_capacity() {
        let config = SessionConfig {
            message_buffer_size: 1,
            ..SessionConfig::default()
        };
        let (session, mut outbound, _transport, _remote) =
            make_session_with(config, Arc::new(Handlers::default()));
        session.write("first").await.unwrap();

        let writer = {
            let session = session.clone();
            tokio::spawn(async move { session.write("second").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!writer.is_finished());

        assert!(outbound.recv().await.is_some());
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn racing_enqueue_reports_through_error_handler() {
        let handlers = Arc::new(Handlers::default());
        let reports = Arc::new(AtomicUsize::new(0));
        let reports2 = reports.clone();
        *handlers.error.write() = Some(Arc::new(move |_s, error| {
            assert!(matches!(error, SessionError::Closed));
            let _ = reports2.fetch_add(1, Ordering::SeqCst);
        }));
        let (transport, _remote) = MockTransport::pair();
        let (session, outbound) =
            Session::new(transport, SessionConfig::default(), handlers);

        // Simulate the race: the queue closed underneath a caller whose
        // pre-check saw the session still open.
        drop(outbound);
        let result = session.write("racing").await;
        assert!(matches!(result, Err(SessionError::Closed)));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(reports.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_with_msg_carries_payload() {
        let (session, mut outbound, _transport, _remote) = make_session();
        let payload = crate::format_close_message(1000, "done");
        session.close_with_msg(payload.clone()).await.unwrap();
        let env = outbound.recv().await.unwrap();
        assert_eq!(env.kind(), FrameKind::Close);
        assert_eq!(env.payload(), &payload);
    }

    #[tokio::test]
    async fn attributes_accessible() {
        let (session, _outbound, _transport, _remote) = make_session();
        session.attributes().insert("role", "admin".to_owned());
        assert_eq!(
            session.attributes().get_as::<String>("role").as_deref(),
            Some(&"admin".to_owned())
        );
    }

    #[tokio::test]
    async fn debug_format_mentions_state() {
        let (session, _outbound, _transport, _remote) = make_session();
        assert!(format!("{session:?}").contains("closed: false"));
    }
}
