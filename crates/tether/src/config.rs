//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Behavior of an enqueue attempt when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Suspend the caller until queue capacity frees up.
    Block,
    /// Fail the enqueue immediately with a queue-full error.
    Reject,
}

/// Configuration shared by every session a hub creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Per-write deadline applied before every transport write.
    pub write_wait: Duration,
    /// Base read deadline; a peer silent for longer than this is dead.
    pub pong_wait: Duration,
    /// Heartbeat interval. Must be shorter than `pong_wait` for the
    /// liveness probe to have effect.
    pub ping_period: Duration,
    /// Maximum accepted inbound message size in bytes.
    pub max_message_size: usize,
    /// Outbound queue capacity.
    pub message_buffer_size: usize,
    /// Minimum interval between read-deadline renewal calls. Renewals
    /// requested more often than this are coalesced.
    pub renewal_coalesce: Duration,
    /// Behavior of enqueue attempts against a full outbound queue.
    pub backpressure: BackpressurePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait: Duration::from_secs(60),
            ping_period: Duration::from_secs(54),
            max_message_size: 512,
            message_buffer_size: 256,
            renewal_coalesce: Duration::from_secs(1),
            backpressure: BackpressurePolicy::Block,
        }
    }
}

impl SessionConfig {
    /// Check the configuration invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ping_period.is_zero() {
            return Err(ConfigError::ZeroPingPeriod);
        }
        if self.ping_period >= self.pong_wait {
            return Err(ConfigError::PingPeriodTooLong {
                ping_period: self.ping_period,
                pong_wait: self.pong_wait,
            });
        }
        if self.message_buffer_size == 0 {
            return Err(ConfigError::ZeroMessageBuffer);
        }
        Ok(())
    }
}

/// Configuration validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The heartbeat interval must be non-zero.
    #[error("ping period must be non-zero")]
    ZeroPingPeriod,

    /// The heartbeat must fire at least once within the read-deadline
    /// window, or silent peers are never probed in time.
    #[error("ping period ({ping_period:?}) must be shorter than pong wait ({pong_wait:?})")]
    PingPeriodTooLong {
        /// Configured heartbeat interval.
        ping_period: Duration,
        /// Configured read-deadline base.
        pong_wait: Duration,
    },

    /// The outbound queue must have capacity for at least one envelope.
    #[error("message buffer size must be non-zero")]
    ZeroMessageBuffer,
}
