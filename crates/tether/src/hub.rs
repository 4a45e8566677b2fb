//! Session registry, handler registration, broadcast fan-out, and the
//! per-connection lifecycle driver.

use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use metrics::{counter, gauge};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ConfigError, SessionConfig};
use crate::envelope::Envelope;
use crate::errors::Result;
use crate::handlers::Handlers;
use crate::session::{read_pump, write_pump, Session};
use crate::transport::Transport;

/// Creates sessions from accepted transports, tracks the live set, and
/// offers broadcast fan-out across it.
///
/// One hub serves many sessions; its configuration and handler registry
/// are shared by all of them. Handlers can be (re)installed at any time
/// and apply to dispatches that start afterwards.
pub struct Hub {
    config: SessionConfig,
    handlers: Arc<Handlers>,
    sessions: DashMap<Uuid, Arc<Session>>,
}

impl Hub {
    /// Create a hub with a validated configuration.
    pub fn new(config: SessionConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            handlers: Arc::new(Handlers::default()),
            sessions: DashMap::new(),
        })
    }

    /// Create a hub with the default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: SessionConfig::default(),
            handlers: Arc::new(Handlers::default()),
            sessions: DashMap::new(),
        }
    }

    /// The configuration applied to every session this hub creates.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Install the handler invoked when a session opens.
    pub fn on_connect(&self, handler: impl Fn(Arc<Session>) + Send + Sync + 'static) {
        *self.handlers.connect.write() = Some(Arc::new(handler));
    }

    /// Install the handler invoked after a session fully shuts down.
    pub fn on_disconnect(&self, handler: impl Fn(Arc<Session>) + Send + Sync + 'static) {
        *self.handlers.disconnect.write() = Some(Arc::new(handler));
    }

    /// Install the handler for inbound text messages.
    pub fn on_message(&self, handler: impl Fn(Arc<Session>, Bytes) + Send + Sync + 'static) {
        *self.handlers.message.write() = Some(Arc::new(handler));
    }

    /// Install the handler for inbound binary messages.
    pub fn on_binary_message(
        &self,
        handler: impl Fn(Arc<Session>, Bytes) + Send + Sync + 'static,
    ) {
        *self.handlers.binary_message.write() = Some(Arc::new(handler));
    }

    /// Install the notification hook for successfully written text
    /// messages.
    pub fn on_message_sent(&self, handler: impl Fn(Arc<Session>, Bytes) + Send + Sync + 'static) {
        *self.handlers.message_sent.write() = Some(Arc::new(handler));
    }

    /// Install the notification hook for successfully written binary
    /// messages.
    pub fn on_binary_message_sent(
        &self,
        handler: impl Fn(Arc<Session>, Bytes) + Send + Sync + 'static,
    ) {
        *self.handlers.binary_message_sent.write() = Some(Arc::new(handler));
    }

    /// Install the handler invoked when the peer answers a heartbeat.
    pub fn on_pong(&self, handler: impl Fn(Arc<Session>) + Send + Sync + 'static) {
        *self.handlers.pong.write() = Some(Arc::new(handler));
    }

    /// Install the handler invoked for pump-terminal failures and
    /// enqueue-after-close races.
    pub fn on_error(
        &self,
        handler: impl Fn(Arc<Session>, crate::SessionError) + Send + Sync + 'static,
    ) {
        *self.handlers.error.write() = Some(Arc::new(handler));
    }

    /// Install the handler for inbound close frames. Returning `Err`
    /// suppresses the default close-frame echo.
    pub fn on_close(
        &self,
        handler: impl Fn(Arc<Session>, u16, &str) -> Result<()> + Send + Sync + 'static,
    ) {
        *self.handlers.close.write() = Some(Arc::new(handler));
    }

    /// Run the full lifecycle of one accepted transport.
    ///
    /// Registers a new open session, launches its write pump, runs its read
    /// pump inline, and — once either side terminates — drives teardown,
    /// waits for the writer to drain, and unregisters. Returns when the
    /// session is fully shut down.
    pub async fn handle_transport(&self, transport: impl Transport) {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let (session, outbound) =
            Session::new(transport, self.config.clone(), self.handlers.clone());
        let _ = self.sessions.insert(session.id(), session.clone());
        counter!("sessions_opened_total").increment(1);
        gauge!("sessions_active").increment(1.0);
        info!(session_id = %session.id(), "session opened");

        self.handlers.notify_connect(&session);

        let writer = tokio::spawn(write_pump::run(session.clone(), outbound));
        read_pump::run(session.clone()).await;

        // Covers read-side termination and forced disconnects; a no-op when
        // the write pump already drove teardown.
        session.teardown().await;
        let _ = writer.await;

        let _ = self.sessions.remove(&session.id());
        gauge!("sessions_active").decrement(1.0);
        info!(session_id = %session.id(), "session closed");
        self.handlers.notify_disconnect(&session);
    }

    /// Enqueue a text message to every open session.
    pub async fn broadcast(&self, payload: impl Into<Bytes>) {
        self.fan_out(Envelope::text(payload.into()), |_| true).await;
    }

    /// Enqueue a binary message to every open session.
    pub async fn broadcast_binary(&self, payload: impl Into<Bytes>) {
        self.fan_out(Envelope::binary(payload.into()), |_| true).await;
    }

    /// Enqueue a text message to every open session the filter accepts.
    pub async fn broadcast_filter(
        &self,
        payload: impl Into<Bytes>,
        filter: impl Fn(&Session) -> bool,
    ) {
        self.fan_out(Envelope::text(payload.into()), filter).await;
    }

    async fn fan_out(&self, envelope: Envelope, filter: impl Fn(&Session) -> bool) {
        counter!("broadcasts_total").increment(1);
        for session in self.sessions() {
            if session.is_closed() || !filter(&session) {
                continue;
            }
            if let Err(error) = session.enqueue(envelope.clone()).await {
                debug!(session_id = %session.id(), %error, "broadcast enqueue failed");
            }
        }
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshot of the registered sessions.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Forcibly disconnect every session. Pending outbound messages are
    /// dropped.
    pub async fn close_all(&self) {
        for session in self.sessions() {
            session.disconnect().await;
        }
    }

    /// Gracefully close every session with the given close-frame payload,
    /// usually built with [`crate::format_close_message`]. Queued messages
    /// are delivered first.
    pub async fn close_all_with_msg(&self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        for session in self.sessions() {
            if let Err(error) = session.close_with_msg(payload.clone()).await {
                debug!(session_id = %session.id(), %error, "close_all enqueue failed");
            }
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish()
    }
}
