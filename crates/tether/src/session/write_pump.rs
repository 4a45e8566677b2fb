//! Outbound write loop: drains the queue, injects heartbeat pings, and
//! drives teardown on its terminal transition.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, instrument, warn};

use crate::envelope::{Envelope, FrameKind};
use crate::errors::SessionError;
use crate::transport::TransportError;

use super::Session;

/// Run the write pump until a terminal condition, then invoke the close
/// path exactly once.
///
/// Terminals: a dequeued close envelope (written first), a transport write
/// failure (reported once through the error handler), or the outbound
/// queue closing underneath the pump (a final best-effort close frame is
/// written). Heartbeat pings are injected only when no envelope is
/// pending, so they never reorder application messages.
#[instrument(skip_all, fields(session_id = %session.id))]
pub(crate) async fn run(session: Arc<Session>, mut outbound: mpsc::Receiver<Envelope>) {
    let mut heartbeat = time::interval(session.config.ping_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // interval fires immediately; the first probe belongs one period out
    let _ = heartbeat.tick().await;

    loop {
        tokio::select! {
            biased;

            next = outbound.recv() => match next {
                Some(envelope) => {
                    let kind = envelope.kind();
                    if let Err(error) = write_frame(&session, &envelope).await {
                        warn!(%error, "write failed");
                        counter!("session_write_errors_total").increment(1);
                        session.handlers.dispatch_error(&session, SessionError::Write(error));
                        break;
                    }
                    match kind {
                        FrameKind::Close => {
                            debug!("close frame written");
                            break;
                        }
                        FrameKind::Text => {
                            session
                                .handlers
                                .dispatch_message_sent(&session, envelope.into_payload());
                        }
                        FrameKind::Binary => {
                            session
                                .handlers
                                .dispatch_binary_message_sent(&session, envelope.into_payload());
                        }
                        FrameKind::Ping | FrameKind::Pong => {}
                    }
                }
                None => {
                    // The queue closed underneath us (forced teardown or the
                    // session was dropped): try to leave gracefully.
                    let _ = write_frame(&session, &Envelope::close()).await;
                    debug!("outbound queue closed, draining finished");
                    break;
                }
            },

            _ = heartbeat.tick() => {
                if let Err(error) = write_frame(&session, &Envelope::ping()).await {
                    warn!(%error, "heartbeat ping failed");
                    counter!("session_write_errors_total").increment(1);
                    session.handlers.dispatch_error(&session, SessionError::Write(error));
                    break;
                }
            }
        }
    }

    session.teardown().await;
}

/// Write one frame under a fresh write deadline.
async fn write_frame(session: &Session, envelope: &Envelope) -> Result<(), TransportError> {
    session
        .transport
        .set_write_deadline(Instant::now() + session.config.write_wait);
    session.transport.write_message(envelope).await?;
    counter!("session_frames_written_total").increment(1);
    Ok(())
}
