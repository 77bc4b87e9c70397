//! Dedicated writer task for outbound frames.
//!
//! All outbound traffic funnels through one task fed by an mpsc channel,
//! so concurrent callers never interleave partial frames on the wire and
//! no lock sits on the write path.
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Transport
//! Caller N ─┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PinwireError, Result};

/// Channel capacity for queued outbound frames.
///
/// The slot pool already bounds in-flight requests, so this only needs to
/// absorb short bursts.
const CHANNEL_CAPACITY: usize = 64;

/// Frames drained per wakeup before flushing.
const MAX_BATCH_SIZE: usize = 16;

/// Handle for sending encoded frames to the writer task.
///
/// Cheaply cloneable; shared by the correlator and any future responder.
#[derive(Clone)]
pub(crate) struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue one encoded frame for transmission.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| PinwireError::ConnectionClosed)
    }
}

/// Spawn the writer task over the transport's write half.
pub(crate) fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Receive frames and write them out, batching whatever is already queued
/// into a single flush.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(frame) => frame,
            // All handles dropped: clean shutdown.
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        for frame in &batch {
            writer.write_all(frame).await?;
        }
        writer.flush().await?;
    }
}
