//! Frame struct with typed accessors.
//!
//! Represents one complete framed unit of wire data. Payloads use
//! `bytes::Bytes` so a frame can be handed between tasks without copying.

use bytes::Bytes;

use crate::error::Result;

use super::wire_format::{self, FrameKind};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Request or Response.
    pub kind: FrameKind,
    /// Request slot id this frame belongs to.
    pub id: u8,
    /// Instruction selector byte; present on Request frames only.
    pub instruction: Option<u8>,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a Request frame.
    pub fn request(id: u8, instruction: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Request,
            id,
            instruction: Some(instruction),
            payload: payload.into(),
        }
    }

    /// Create a Response frame.
    pub fn response(id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: FrameKind::Response,
            id,
            instruction: None,
            payload: payload.into(),
        }
    }

    /// Check if this is a Request frame.
    #[inline]
    pub fn is_request(&self) -> bool {
        self.kind == FrameKind::Request
    }

    /// Check if this is a Response frame.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.kind == FrameKind::Response
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Encode this frame into its wire representation.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if the payload exceeds `max_payload`.
    pub fn encode(&self, max_payload: usize) -> Result<Vec<u8>> {
        match self.kind {
            FrameKind::Request => wire_format::encode_request(
                self.id,
                // Request frames are only constructed with an instruction.
                self.instruction.unwrap_or_default(),
                &self.payload,
                max_payload,
            ),
            FrameKind::Response => wire_format::encode_response(self.id, &self.payload, max_payload),
        }
    }
}
