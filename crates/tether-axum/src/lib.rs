//! # tether-axum
//!
//! Binds the `tether` session engine to axum's `WebSocket`.
//!
//! [`WsTransport`] adapts an upgraded socket to the engine's transport
//! trait; [`websocket_route`] wires a [`Hub`] into an axum router in one
//! line:
//!
//! ```rust,ignore
//! let hub = Arc::new(Hub::with_defaults());
//! let app = Router::new().route("/ws", websocket_route(hub.clone()));
//! ```

#![deny(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::routing::{get, MethodRouter};
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use tether::{
    format_close_message, parse_close_message, Envelope, FrameKind, Hub, Transport,
    TransportError,
};

/// [`Transport`] implementation over an upgraded axum `WebSocket`.
///
/// The socket is split once; each half sits behind its own async mutex.
/// The engine's pumps are the sole users of their respective halves, so
/// the locks never contend. Deadlines are stored and enforced around the
/// pending read/write with `timeout_at`. Ping frames are answered by axum
/// itself; they still surface here as read activity.
pub struct WsTransport {
    reader: tokio::sync::Mutex<SplitStream<WebSocket>>,
    writer: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
    read_deadline: Mutex<Option<Instant>>,
    write_deadline: Mutex<Option<Instant>>,
    read_limit: AtomicUsize,
}

impl WsTransport {
    /// Wrap an upgraded socket.
    pub fn new(socket: WebSocket) -> Self {
        let (writer, reader) = socket.split();
        Self {
            reader: tokio::sync::Mutex::new(reader),
            writer: tokio::sync::Mutex::new(writer),
            read_deadline: Mutex::new(None),
            write_deadline: Mutex::new(None),
            read_limit: AtomicUsize::new(usize::MAX),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn read_message(&self) -> Result<Envelope, TransportError> {
        let deadline = *self.read_deadline.lock();
        let mut reader = self.reader.lock().await;
        let next = reader.next();
        let message = match deadline {
            Some(at) => timeout_at(at, next)
                .await
                .map_err(|_| TransportError::DeadlineExceeded)?,
            None => next.await,
        };
        let message = match message {
            Some(Ok(message)) => message,
            Some(Err(error)) => return Err(TransportError::Protocol(error.to_string())),
            None => return Err(TransportError::ConnectionClosed),
        };
        let envelope = from_message(message);
        let limit = self.read_limit.load(Ordering::Relaxed);
        if envelope.payload().len() > limit {
            return Err(TransportError::MessageTooLarge {
                size: envelope.payload().len(),
                limit,
            });
        }
        Ok(envelope)
    }

    async fn write_message(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let message = to_message(envelope)?;
        let deadline = *self.write_deadline.lock();
        let mut writer = self.writer.lock().await;
        let send = writer.send(message);
        match deadline {
            Some(at) => timeout_at(at, send)
                .await
                .map_err(|_| TransportError::DeadlineExceeded)?
                .map_err(|error| TransportError::Protocol(error.to_string())),
            None => send
                .await
                .map_err(|error| TransportError::Protocol(error.to_string())),
        }
    }

    fn set_read_deadline(&self, deadline: Instant) {
        *self.read_deadline.lock() = Some(deadline);
    }

    fn set_write_deadline(&self, deadline: Instant) {
        *self.write_deadline.lock() = Some(deadline);
    }

    fn set_read_limit(&self, limit: usize) {
        self.read_limit.store(limit, Ordering::Relaxed);
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer
            .close()
            .await
            .map_err(|error| TransportError::Protocol(error.to_string()))
    }
}

/// Run the full session lifecycle for an upgraded socket on `hub`.
pub async fn serve(hub: Arc<Hub>, socket: WebSocket) {
    hub.handle_transport(WsTransport::new(socket)).await;
}

/// An axum route upgrading requests and serving hub sessions.
///
/// The upgrade applies the hub's configured maximum message size at the
/// protocol level; the engine enforces the same limit on dispatch.
pub fn websocket_route(hub: Arc<Hub>) -> MethodRouter {
    get(move |upgrade: WebSocketUpgrade| {
        let hub = hub.clone();
        async move {
            let max_message_size = hub.config().max_message_size;
            upgrade
                .max_message_size(max_message_size)
                .on_upgrade(move |socket| serve(hub, socket))
        }
    })
}

fn from_message(message: Message) -> Envelope {
    match message {
        Message::Text(text) => Envelope::text(Bytes::copy_from_slice(text.as_bytes())),
        Message::Binary(data) => Envelope::binary(data),
        Message::Ping(data) => Envelope::new(FrameKind::Ping, data),
        Message::Pong(data) => Envelope::new(FrameKind::Pong, data),
        Message::Close(Some(frame)) => {
            Envelope::close_with(format_close_message(frame.code, frame.reason.as_str()))
        }
        Message::Close(None) => Envelope::close(),
    }
}

fn to_message(envelope: &Envelope) -> Result<Message, TransportError> {
    match envelope.kind() {
        FrameKind::Text => {
            let text = std::str::from_utf8(envelope.payload()).map_err(|_| {
                debug!("rejecting text frame with non-utf8 payload");
                TransportError::Protocol("text frame payload is not valid utf-8".into())
            })?;
            Ok(Message::Text(text.to_owned().into()))
        }
        FrameKind::Binary => Ok(Message::Binary(envelope.payload().clone())),
        FrameKind::Ping => Ok(Message::Ping(envelope.payload().clone())),
        FrameKind::Pong => Ok(Message::Pong(envelope.payload().clone())),
        FrameKind::Close => Ok(Message::Close(to_close_frame(envelope.payload()))),
    }
}

fn to_close_frame(payload: &[u8]) -> Option<CloseFrame> {
    if payload.is_empty() {
        return None;
    }
    let (code, reason) = parse_close_message(payload);
    Some(CloseFrame {
        code,
        reason: reason.into(),
    })
}
