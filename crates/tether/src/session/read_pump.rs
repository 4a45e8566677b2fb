//! Inbound read loop: deadline renewal, frame dispatch, and close-frame
//! forwarding.

use std::sync::Arc;

use metrics::counter;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::envelope::{close_code, format_close_message, parse_close_message, Envelope, FrameKind};
use crate::errors::SessionError;

use super::Session;

/// Run the read pump until a read fails, the peer's close frame leads to a
/// closed connection, or the session is torn down.
///
/// The pump never drives teardown itself — an envelope already in flight on
/// the write side is not lost to a read failure. A failed read is reported
/// once through the error handler; a cancellation exit (forced teardown) is
/// silent.
#[instrument(skip_all, fields(session_id = %session.id))]
pub(crate) async fn run(session: Arc<Session>) {
    session
        .transport
        .set_read_limit(session.config.max_message_size);
    session
        .transport
        .set_read_deadline(Instant::now() + session.config.pong_wait);
    let mut last_renewal = Instant::now();

    loop {
        tokio::select! {
            () = session.shutdown.cancelled() => {
                debug!("read pump released");
                break;
            }
            next = session.transport.read_message() => match next {
                Ok(envelope) => {
                    renew_deadline(&session, &mut last_renewal);
                    counter!("session_frames_read_total").increment(1);
                    dispatch(&session, envelope);
                }
                Err(error) => {
                    debug!(%error, "read failed");
                    counter!("session_read_errors_total").increment(1);
                    session.handlers.dispatch_error(&session, SessionError::Read(error));
                    break;
                }
            }
        }
    }
}

/// Renew the read deadline to `now + pong_wait + ping_period`, issuing the
/// transport call at most once per coalescing window.
fn renew_deadline(session: &Session, last_renewal: &mut Instant) {
    let now = Instant::now();
    if now.duration_since(*last_renewal) < session.config.renewal_coalesce {
        return;
    }
    *last_renewal = now;
    session
        .transport
        .set_read_deadline(now + session.config.pong_wait + session.config.ping_period);
}

/// Dispatch one inbound frame. Message and pong handlers run as detached
/// tasks in arrival order; their completion order is unspecified.
fn dispatch(session: &Arc<Session>, envelope: Envelope) {
    match envelope.kind() {
        FrameKind::Text => session
            .handlers
            .dispatch_message(session, envelope.into_payload()),
        FrameKind::Binary => session
            .handlers
            .dispatch_binary_message(session, envelope.into_payload()),
        FrameKind::Pong => session.handlers.dispatch_pong(session),
        // The transport answers pings itself; the read still renewed the
        // deadline above.
        FrameKind::Ping => {}
        FrameKind::Close => forward_close(session, &envelope),
    }
}

/// Forward an inbound close frame to the close hook, echoing a close frame
/// back unless the hook suppresses it. The loop keeps running; the
/// connection-level shutdown surfaces as the next read's error.
fn forward_close(session: &Arc<Session>, envelope: &Envelope) {
    let (code, reason) = parse_close_message(envelope.payload());
    debug!(code, "close frame received");
    let suppress = matches!(
        session.handlers.on_close_frame(session, code, &reason),
        Some(Err(_))
    );
    if suppress {
        return;
    }
    let echo = if code == close_code::NO_STATUS {
        Envelope::close()
    } else {
        Envelope::close_with(format_close_message(code, ""))
    };
    if let Some(tx) = session.outbound.lock().clone() {
        let _ = tx.try_send(echo);
    }
}
