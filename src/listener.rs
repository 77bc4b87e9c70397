//! Listener task - demultiplexes the inbound byte stream.
//!
//! One long-lived task owns the read half for the lifetime of the
//! connection: bytes go through the frame scanner, complete Response
//! frames fill the matching request slot, complete Request frames go to
//! the inbound dispatcher. A started frame gets a fixed inactivity budget;
//! when it expires the partial frame is discarded and scanning resumes at
//! the next start marker, so one corrupted or stalled frame can never wedge
//! the stream. Nothing at the framing layer stops this task; it exits only
//! when the transport closes or errors.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::handler::InboundDispatcher;
use crate::pool::RequestPool;
use crate::protocol::{FrameBuffer, FrameKind};

/// Read buffer size; frames are at most ~a hundred bytes.
const READ_BUF_SIZE: usize = 256;

/// Run the listener until the transport closes.
pub(crate) async fn listener_loop<R>(
    mut reader: R,
    pool: Arc<RequestPool>,
    dispatcher: Arc<InboundDispatcher>,
    config: ProtocolConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut scanner = FrameBuffer::new(config.max_payload_length, config.max_concurrent_requests);
    let mut buf = [0u8; READ_BUF_SIZE];

    loop {
        let n = if scanner.mid_frame() {
            // A frame is in progress; it must keep arriving or be dropped.
            match timeout(config.frame_inactivity_timeout, reader.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => {
                    tracing::warn!("partial frame stalled; discarding and resynchronizing");
                    scanner.abandon_frame();
                    continue;
                }
            }
        } else {
            reader.read(&mut buf).await?
        };

        if n == 0 {
            tracing::debug!("transport closed");
            return Ok(());
        }

        for frame in scanner.push(&buf[..n]) {
            match frame.kind {
                FrameKind::Response => pool.fill(frame.id, frame.payload),
                FrameKind::Request => {
                    if let Err(err) = dispatcher.dispatch(&frame) {
                        tracing::warn!(%err, id = frame.id, "inbound dispatch failed");
                    }
                }
            }
        }
    }
}
