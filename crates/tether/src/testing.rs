//! Scriptable in-memory transport shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::config::SessionConfig;
use crate::envelope::Envelope;
use crate::handlers::Handlers;
use crate::session::Session;
use crate::transport::{Transport, TransportError};

/// Peer half of a [`MockTransport`]: feeds inbound frames and scripted
/// read failures. Dropping it makes subsequent reads fail with
/// `ConnectionClosed`.
pub(crate) struct MockRemote {
    tx: mpsc::UnboundedSender<Result<Envelope, TransportError>>,
}

impl MockRemote {
    pub(crate) fn send(&self, envelope: Envelope) {
        let _ = self.tx.send(Ok(envelope));
    }

    pub(crate) fn fail_read(&self, error: TransportError) {
        let _ = self.tx.send(Err(error));
    }
}

/// In-memory transport double with observation counters.
pub(crate) struct MockTransport {
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Envelope, TransportError>>>,
    written: Mutex<Vec<Envelope>>,
    writes_attempted: AtomicUsize,
    fail_write_on: Mutex<Option<usize>>,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    read_deadline: Mutex<Option<Instant>>,
    read_deadline_calls: AtomicUsize,
    write_deadline: Mutex<Option<Instant>>,
    read_limit: AtomicUsize,
}

impl MockTransport {
    pub(crate) fn pair() -> (Arc<Self>, MockRemote) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            incoming: tokio::sync::Mutex::new(rx),
            written: Mutex::new(Vec::new()),
            writes_attempted: AtomicUsize::new(0),
            fail_write_on: Mutex::new(None),
            close_calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            read_deadline: Mutex::new(None),
            read_deadline_calls: AtomicUsize::new(0),
            write_deadline: Mutex::new(None),
            read_limit: AtomicUsize::new(usize::MAX),
        });
        (transport, MockRemote { tx })
    }

    /// Make the n-th write attempt (1-based) fail with `ConnectionClosed`.
    pub(crate) fn fail_write_on(&self, attempt: usize) {
        *self.fail_write_on.lock() = Some(attempt);
    }

    pub(crate) fn written(&self) -> Vec<Envelope> {
        self.written.lock().clone()
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn read_deadline_calls(&self) -> usize {
        self.read_deadline_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn read_limit(&self) -> usize {
        self.read_limit.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn read_message(&self) -> Result<Envelope, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let deadline = *self.read_deadline.lock();
        let mut incoming = self.incoming.lock().await;
        let next = match deadline {
            Some(at) => tokio::time::timeout_at(at, incoming.recv())
                .await
                .map_err(|_| TransportError::DeadlineExceeded)?,
            None => incoming.recv().await,
        };
        match next {
            Some(result) => {
                let envelope = result?;
                let limit = self.read_limit.load(Ordering::SeqCst);
                if envelope.payload().len() > limit {
                    return Err(TransportError::MessageTooLarge {
                        size: envelope.payload().len(),
                        limit,
                    });
                }
                Ok(envelope)
            }
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn write_message(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionClosed);
        }
        let attempt = self.writes_attempted.fetch_add(1, Ordering::SeqCst) + 1;
        if *self.fail_write_on.lock() == Some(attempt) {
            return Err(TransportError::ConnectionClosed);
        }
        self.written.lock().push(envelope.clone());
        Ok(())
    }

    fn set_read_deadline(&self, deadline: Instant) {
        *self.read_deadline.lock() = Some(deadline);
        let _ = self.read_deadline_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn set_write_deadline(&self, deadline: Instant) {
        *self.write_deadline.lock() = Some(deadline);
    }

    fn set_read_limit(&self, limit: usize) {
        self.read_limit.store(limit, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A session over a fresh mock transport with default config and empty
/// handlers.
pub(crate) fn make_session() -> (
    Arc<Session>,
    mpsc::Receiver<Envelope>,
    Arc<MockTransport>,
    MockRemote,
) {
    make_session_with(SessionConfig::default(), Arc::new(Handlers::default()))
}

/// A session over a fresh mock transport with the given config and
/// handlers.
pub(crate) fn make_session_with(
    config: SessionConfig,
    handlers: Arc<Handlers>,
) -> (
    Arc<Session>,
    mpsc::Receiver<Envelope>,
    Arc<MockTransport>,
    MockRemote,
) {
    let (transport, remote) = MockTransport::pair();
    let (session, outbound) = Session::new(transport.clone(), config, handlers);
    (session, outbound, transport, remote)
}
