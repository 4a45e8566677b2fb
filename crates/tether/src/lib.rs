//! # tether
//!
//! Session lifecycle engine for framed duplex (`WebSocket`-style)
//! transports.
//!
//! - Session state machine: open → closed, exactly-once teardown shared by
//!   every close path
//! - Two pumps per session: a sole-reader inbound loop and a sole-writer
//!   outbound loop, scheduled independently so a blocked read never stalls
//!   writes
//! - Heartbeat pings and coalesced read-deadline renewal for liveness
//! - Bounded outbound queue with configurable backpressure
//! - [`Hub`]: session registry, handler callbacks, broadcast fan-out
//!
//! The engine is transport-agnostic: it drives any implementation of
//! [`Transport`]. An adapter for axum's `WebSocket` lives in the
//! `tether-axum` crate.

#![deny(unsafe_code)]

mod attributes;
mod config;
mod envelope;
mod errors;
mod handlers;
mod hub;
mod session;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use attributes::Attributes;
pub use config::{BackpressurePolicy, ConfigError, SessionConfig};
pub use envelope::{close_code, format_close_message, parse_close_message, Envelope, FrameKind};
pub use errors::{Result, SessionError};
pub use hub::Hub;
pub use session::Session;
pub use transport::{Transport, TransportError};
