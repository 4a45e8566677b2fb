//! Frame model and close-frame payload convention.

use bytes::Bytes;

/// Kind of a transport frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// UTF-8 text message.
    Text,
    /// Binary message.
    Binary,
    /// Liveness probe.
    Ping,
    /// Answer to a liveness probe.
    Pong,
    /// Close frame carrying an optional status code + reason payload.
    Close,
}

/// One unit of transport traffic: a frame kind plus its payload.
///
/// Immutable once constructed. Outbound envelopes are delivered to the
/// transport in the order they were enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    kind: FrameKind,
    payload: Bytes,
}

impl Envelope {
    /// Create an envelope of an arbitrary kind.
    pub fn new(kind: FrameKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// Text message envelope.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Text, payload)
    }

    /// Binary message envelope.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Binary, payload)
    }

    /// Empty-payload ping envelope.
    pub fn ping() -> Self {
        Self::new(FrameKind::Ping, Bytes::new())
    }

    /// Empty-payload pong envelope.
    pub fn pong() -> Self {
        Self::new(FrameKind::Pong, Bytes::new())
    }

    /// Close envelope with no status code or reason.
    pub fn close() -> Self {
        Self::new(FrameKind::Close, Bytes::new())
    }

    /// Close envelope carrying a payload, usually built with
    /// [`format_close_message`].
    pub fn close_with(payload: impl Into<Bytes>) -> Self {
        Self::new(FrameKind::Close, payload)
    }

    /// The frame kind.
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// The frame payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the envelope, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

/// Standard close status codes.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away.
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// Received a data type it cannot accept.
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// No status code was present in the close frame.
    ///
    /// Reserved; never sent on the wire.
    pub const NO_STATUS: u16 = 1005;
    /// Connection dropped without a close frame.
    ///
    /// Reserved; never sent on the wire.
    pub const ABNORMAL: u16 = 1006;
    /// Payload inconsistent with the message type.
    pub const INVALID_PAYLOAD: u16 = 1007;
    /// Message violates endpoint policy.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Message too big to process.
    pub const MESSAGE_TOO_BIG: u16 = 1009;
    /// Server encountered an unexpected condition.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Encode a close-frame payload: 2-byte big-endian status code followed by
/// optional UTF-8 reason text.
pub fn format_close_message(code: u16, reason: &str) -> Bytes {
    let mut buf = Vec::with_capacity(2 + reason.len());
    buf.extend_from_slice(&code.to_be_bytes());
    buf.extend_from_slice(reason.as_bytes());
    Bytes::from(buf)
}

/// Decode a close-frame payload into `(status code, reason)`.
///
/// A payload shorter than the 2-byte status code yields
/// [`close_code::NO_STATUS`] and an empty reason. Non-UTF-8 reason bytes are
/// replaced lossily.
pub fn parse_close_message(payload: &[u8]) -> (u16, String) {
    if payload.len() < 2 {
        return (close_code::NO_STATUS, String::new());
    }
    let code = u16::from_be_bytes([payload[0], payload[1]]);
    let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
    (code, reason)
}
