//! Transport seam - the byte-level collaborator the engine runs over.
//!
//! The physical link (serial port, pty, socket) is not part of this crate;
//! anything that can read and write bytes asynchronously qualifies. Tests
//! use `tokio::io::duplex` in-memory pipes.

use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream the session can own.
///
/// Blanket-implemented for every async stream type; a disconnect shows up
/// as end-of-stream on the read half or a write error.
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}
