//! Incremental frame reassembly from a raw byte stream.
//!
//! Implements the listener's scanning discipline: bytes are discarded
//! until a start marker appears, then the frame body is accumulated using
//! the declared length, and finally the matching end marker is required.
//! Anything that violates the format is logged and dropped; the scanner
//! resynchronizes at the next start marker and never fails permanently.
//!
//! The inactivity budget for a started frame is enforced by the caller
//! (the listener owns the clock); [`FrameBuffer::abandon_frame`] discards
//! the partial frame when that budget expires.

use bytes::BytesMut;

use super::wire_format::{self, FrameKind};
use super::Frame;

/// Scanner state between `push` calls.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Discarding bytes until a start marker.
    Scanning,
    /// Accumulating the fixed header (id, length, instruction for Requests).
    Header { kind: FrameKind, need: usize },
    /// Accumulating `remaining` declared payload bytes.
    Payload { kind: FrameKind, remaining: usize },
    /// Expecting the end marker for `kind`.
    End { kind: FrameKind },
}

/// Reassembles complete frames from arbitrarily fragmented reads.
pub struct FrameBuffer {
    state: State,
    /// Body bytes of the frame in progress (everything between markers).
    body: BytesMut,
    max_payload: usize,
    max_requests: u8,
}

impl FrameBuffer {
    /// Create a scanner with the given limits.
    pub fn new(max_payload: usize, max_requests: u8) -> Self {
        Self {
            state: State::Scanning,
            body: BytesMut::with_capacity(max_payload + 4),
            max_payload,
            max_requests,
        }
    }

    /// Push raw bytes and extract every frame they complete.
    ///
    /// Malformed frames are logged and skipped, never returned.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for &byte in data {
            if let Some(frame) = self.feed(byte) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Whether a frame is currently in progress.
    #[inline]
    pub fn mid_frame(&self) -> bool {
        !matches!(self.state, State::Scanning)
    }

    /// Discard the partial frame and return to marker scanning.
    ///
    /// Called by the listener when the per-frame inactivity budget expires.
    pub fn abandon_frame(&mut self) {
        self.body.clear();
        self.state = State::Scanning;
    }

    fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            State::Scanning => {
                if let Some(kind) = FrameKind::from_start_marker(byte) {
                    self.begin(kind);
                }
                None
            }

            State::Header { kind, need } => {
                self.body.extend_from_slice(&[byte]);
                if need > 1 {
                    self.state = State::Header { kind, need: need - 1 };
                    return None;
                }

                let declared = self.body[1] as usize;
                if declared > self.max_payload {
                    tracing::warn!(
                        declared,
                        max = self.max_payload,
                        "frame declares oversized payload; dropping"
                    );
                    self.abandon_frame();
                    return None;
                }
                self.state = if declared > 0 {
                    State::Payload { kind, remaining: declared }
                } else {
                    State::End { kind }
                };
                None
            }

            State::Payload { kind, remaining } => {
                self.body.extend_from_slice(&[byte]);
                self.state = if remaining > 1 {
                    State::Payload { kind, remaining: remaining - 1 }
                } else {
                    State::End { kind }
                };
                None
            }

            State::End { kind } => {
                if byte == kind.end_marker() {
                    return self.complete(kind);
                }

                tracing::warn!(
                    expected = kind.end_marker(),
                    got = byte,
                    "missing end marker; dropping frame and resynchronizing"
                );
                self.abandon_frame();
                // The offending byte may itself open the next frame.
                if let Some(next) = FrameKind::from_start_marker(byte) {
                    self.begin(next);
                }
                None
            }
        }
    }

    fn begin(&mut self, kind: FrameKind) {
        self.body.clear();
        let need = match kind {
            FrameKind::Request => 3,
            FrameKind::Response => 2,
        };
        self.state = State::Header { kind, need };
    }

    fn complete(&mut self, kind: FrameKind) -> Option<Frame> {
        let body = self.body.split().freeze();
        self.state = State::Scanning;

        match wire_format::decode_body(kind, &body, self.max_requests) {
            Ok(frame) => Some(frame),
            Err(err) => {
                tracing::warn!(%err, "dropping invalid frame");
                None
            }
        }
    }
}
