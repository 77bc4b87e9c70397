//! Error types for pinwire.

use thiserror::Error;

/// Main error type for all pinwire operations.
#[derive(Debug, Error)]
pub enum PinwireError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No synchronized peer within the handshake deadline.
    ///
    /// Fatal to connection setup; the session is never established.
    #[error("handshake failed: no synchronized peer within the deadline")]
    HandshakeFailed,

    /// No free request id. Backpressure, not a hard failure: retry, or use
    /// the waiting allocation path.
    #[error("request pool exhausted: all {0} ids in flight")]
    PoolExhausted(u8),

    /// The per-call response deadline elapsed. Recoverable; the request id
    /// has already been reclaimed.
    #[error("timed out waiting for the response to request {0}")]
    ResponseTimeout(u8),

    /// A received frame violated the wire format (wrong declared length,
    /// wrong end marker). The frame is dropped; the connection stays alive.
    #[error("malformed frame: {0}")]
    MalformedFrame(&'static str),

    /// A received frame carried a request id outside the pool range.
    #[error("request id {id} out of range (max {max})")]
    RequestIdOutOfRange { id: u8, max: u8 },

    /// Payload does not fit in a frame.
    #[error("payload length {len} exceeds maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// Inbound dispatch could not resolve an instruction byte.
    #[error("unknown instruction byte 0x{0:02X}")]
    UnknownInstruction(u8),

    /// An instruction byte collides with a frame marker and can never be
    /// sent on the wire.
    #[error("instruction byte 0x{0:02X} collides with a frame marker")]
    ReservedInstruction(u8),

    /// A host function id was registered twice.
    #[error("host function {0} is already registered")]
    FunctionAlreadyRegistered(u8),

    /// A response payload could not be decoded into the caller's type.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The transport closed underneath the session.
    #[error("connection closed")]
    ConnectionClosed,
}

/// Result type alias using PinwireError.
pub type Result<T> = std::result::Result<T, PinwireError>;
