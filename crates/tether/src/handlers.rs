//! Handler callbacks invoked by the session pumps.
//!
//! Message, sent-notification, pong, and error hooks run as detached
//! tasks: the pumps never wait on them, nothing orders their completion,
//! and nothing cancels them at session shutdown — a handler may outlive
//! its session. Connect and disconnect run inline in the lifecycle driver
//! so they bracket all message dispatch. The close-frame hook runs inline
//! in the read pump because its return value decides whether the default
//! close echo is sent.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::errors::SessionError;
use crate::session::Session;

type Slot<T> = RwLock<Option<Arc<T>>>;

pub(crate) type MessageFn = dyn Fn(Arc<Session>, Bytes) + Send + Sync;
pub(crate) type SessionFn = dyn Fn(Arc<Session>) + Send + Sync;
pub(crate) type ErrorFn = dyn Fn(Arc<Session>, SessionError) + Send + Sync;
pub(crate) type CloseFn =
    dyn Fn(Arc<Session>, u16, &str) -> crate::errors::Result<()> + Send + Sync;

/// Registered callback slots, shared by every session of a hub.
///
/// Slots may be replaced at any time; dispatch clones the current handler
/// out of the slot, so an in-flight dispatch keeps the handler it started
/// with.
#[derive(Default)]
pub(crate) struct Handlers {
    pub(crate) connect: Slot<SessionFn>,
    pub(crate) disconnect: Slot<SessionFn>,
    pub(crate) message: Slot<MessageFn>,
    pub(crate) binary_message: Slot<MessageFn>,
    pub(crate) message_sent: Slot<MessageFn>,
    pub(crate) binary_message_sent: Slot<MessageFn>,
    pub(crate) pong: Slot<SessionFn>,
    pub(crate) error: Slot<ErrorFn>,
    pub(crate) close: Slot<CloseFn>,
}

impl Handlers {
    fn spawn_payload(slot: &Slot<MessageFn>, session: &Arc<Session>, payload: Bytes) {
        if let Some(handler) = slot.read().clone() {
            let session = session.clone();
            let _ = tokio::spawn(async move { handler(session, payload) });
        }
    }

    pub(crate) fn dispatch_message(&self, session: &Arc<Session>, payload: Bytes) {
        Self::spawn_payload(&self.message, session, payload);
    }

    pub(crate) fn dispatch_binary_message(&self, session: &Arc<Session>, payload: Bytes) {
        Self::spawn_payload(&self.binary_message, session, payload);
    }

    pub(crate) fn dispatch_message_sent(&self, session: &Arc<Session>, payload: Bytes) {
        Self::spawn_payload(&self.message_sent, session, payload);
    }

    pub(crate) fn dispatch_binary_message_sent(&self, session: &Arc<Session>, payload: Bytes) {
        Self::spawn_payload(&self.binary_message_sent, session, payload);
    }

    pub(crate) fn dispatch_pong(&self, session: &Arc<Session>) {
        if let Some(handler) = self.pong.read().clone() {
            let session = session.clone();
            let _ = tokio::spawn(async move { handler(session) });
        }
    }

    pub(crate) fn dispatch_error(&self, session: &Arc<Session>, error: SessionError) {
        if let Some(handler) = self.error.read().clone() {
            let session = session.clone();
            let _ = tokio::spawn(async move { handler(session, error) });
        }
    }

    pub(crate) fn notify_connect(&self, session: &Arc<Session>) {
        if let Some(handler) = self.connect.read().clone() {
            handler(session.clone());
        }
    }

    pub(crate) fn notify_disconnect(&self, session: &Arc<Session>) {
        if let Some(handler) = self.disconnect.read().clone() {
            handler(session.clone());
        }
    }

    /// Invoke the close-frame hook inline. `None` when no hook is
    /// installed; `Some(Err(_))` suppresses the default close echo.
    pub(crate) fn on_close_frame(
        &self,
        session: &Arc<Session>,
        code: u16,
        reason: &str,
    ) -> Option<crate::errors::Result<()>> {
        self.close
            .read()
            .clone()
            .map(|handler| handler(session.clone(), code, reason))
    }
}
