//! Connection handshake - frame-boundary synchronization.
//!
//! Before any application traffic, both ends must agree they are reading
//! at a frame boundary (either side may have restarted mid-frame). The
//! exchange is a minimal three-way handshake reusing the Request frame
//! shape with a single nonce byte in place of the id:
//!
//! 1. send `< x >` with a fresh nonce `x`, resending every
//!    `handshake_resend_interval`
//! 2. wait for the peer to echo `x`; frames echoing anything else are
//!    ignored
//! 3. the next frame `< z >` carries the peer's own nonce; acknowledge it
//!    with `< z >` once and the session is established
//!
//! Anything that is not a well-formed nonce frame is discarded. If the
//! exchange does not complete within `handshake_timeout` the connection
//! attempt fails with `HandshakeFailed`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, MissedTickBehavior};

use crate::config::ProtocolConfig;
use crate::error::{PinwireError, Result};
use crate::protocol::{REQUEST_END, REQUEST_START};

/// Run the initiator side of the handshake.
pub(crate) async fn initiate<R, W>(
    reader: &mut R,
    writer: &mut W,
    config: &ProtocolConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    initiate_with_nonce(reader, writer, config, random_nonce()).await
}

/// Handshake with a caller-chosen nonce. Split out for deterministic tests.
async fn initiate_with_nonce<R, W>(
    reader: &mut R,
    writer: &mut W,
    config: &ProtocolConfig,
    nonce: u8,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    match timeout(config.handshake_timeout, exchange(reader, writer, config, nonce)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                timeout_ms = config.handshake_timeout.as_millis() as u64,
                "handshake deadline elapsed"
            );
            Err(PinwireError::HandshakeFailed)
        }
    }
}

async fn exchange<R, W>(
    reader: &mut R,
    writer: &mut W,
    config: &ProtocolConfig,
    nonce: u8,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let syn = [REQUEST_START, nonce, REQUEST_END];
    writer.write_all(&syn).await?;
    writer.flush().await?;

    let mut resend = tokio::time::interval(config.handshake_resend_interval);
    resend.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; the SYN just went out.
    resend.tick().await;

    let mut scanner = NonceScanner::default();
    let mut echoed = false;
    let mut buf = [0u8; 64];

    loop {
        tokio::select! {
            _ = resend.tick() => {
                writer.write_all(&syn).await?;
                writer.flush().await?;
            }
            read = reader.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Err(PinwireError::ConnectionClosed);
                }
                for received in scanner.push(&buf[..n]) {
                    if !echoed {
                        if received == nonce {
                            echoed = true;
                        }
                    } else {
                        // The peer's own nonce; acknowledge exactly once.
                        let ack = [REQUEST_START, received, REQUEST_END];
                        writer.write_all(&ack).await?;
                        writer.flush().await?;
                        tracing::debug!("handshake established");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Scanner for the 3-byte nonce frames used during the handshake.
#[derive(Default)]
struct NonceScanner {
    state: ScanState,
}

#[derive(Default, Clone, Copy)]
enum ScanState {
    #[default]
    Idle,
    Started,
    Nonce(u8),
}

impl NonceScanner {
    /// Push bytes, yielding the nonce of every complete `< n >` frame.
    fn push(&mut self, data: &[u8]) -> Vec<u8> {
        let mut nonces = Vec::new();
        for &byte in data {
            self.state = match self.state {
                ScanState::Idle if byte == REQUEST_START => ScanState::Started,
                ScanState::Idle => ScanState::Idle,
                ScanState::Started => ScanState::Nonce(byte),
                ScanState::Nonce(nonce) if byte == REQUEST_END => {
                    nonces.push(nonce);
                    ScanState::Idle
                }
                // Malformed; the offending byte may open the next frame.
                ScanState::Nonce(_) if byte == REQUEST_START => ScanState::Started,
                ScanState::Nonce(_) => ScanState::Idle,
            };
        }
        nonces
    }
}

/// Nonce from a time and pid mix; collisions only cost a retry.
fn random_nonce() -> u8 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let pid = std::process::id() as u64;

    let mixed = nanos.wrapping_mul(0x517c_c1b7_2722_0a95) ^ pid;
    (mixed ^ (mixed >> 32) ^ (mixed >> 13)) as u8
}
