//! Protocol configuration.
//!
//! All timing and sizing knobs for a session live in [`ProtocolConfig`].
//! The defaults come from the reference firmware contract and work for a
//! typical USB serial link; tune them through the builder setters on
//! [`SessionBuilder`](crate::SessionBuilder).

use std::time::Duration;

/// Default overall handshake deadline.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default interval between handshake SYN resends.
pub const DEFAULT_HANDSHAKE_RESEND_INTERVAL: Duration = Duration::from_millis(10);

/// Default inactivity budget for completing a started frame.
pub const DEFAULT_FRAME_INACTIVITY_TIMEOUT: Duration = Duration::from_millis(10);

/// Default per-call response deadline.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of concurrently in-flight request ids.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: u8 = 50;

/// Default maximum payload length per frame.
pub const DEFAULT_MAX_PAYLOAD_LENGTH: usize = 100;

/// Timing and sizing configuration for a session.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Overall deadline for establishing the handshake.
    pub handshake_timeout: Duration,
    /// How often the handshake SYN frame is resent until acknowledged.
    pub handshake_resend_interval: Duration,
    /// Inactivity budget for a started frame; a partial frame older than
    /// this is discarded and the listener resynchronizes.
    pub frame_inactivity_timeout: Duration,
    /// Per-call deadline for the matching response.
    pub response_timeout: Duration,
    /// Capacity of the request id pool. Request ids on the wire are a
    /// single byte, so this is at most 255.
    pub max_concurrent_requests: u8,
    /// Maximum payload bytes per frame (the length field is one byte).
    pub max_payload_length: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            handshake_resend_interval: DEFAULT_HANDSHAKE_RESEND_INTERVAL,
            frame_inactivity_timeout: DEFAULT_FRAME_INACTIVITY_TIMEOUT,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_payload_length: DEFAULT_MAX_PAYLOAD_LENGTH,
        }
    }
}

impl ProtocolConfig {
    /// Create a configuration with the default tunables.
    pub fn new() -> Self {
        Self::default()
    }
}
