//! Wire format encoding and decoding.
//!
//! Two frame shapes, bounded by ASCII markers:
//!
//! ```text
//! Request:   '<'  id  length  instruction  payload...  '>'
//! Response:  '?'  id  length               payload...  '!'
//! ```
//!
//! The length byte is read before the terminating marker, so frame
//! boundaries never depend on scanning for markers inside the payload:
//! the decoder consumes exactly `length` payload bytes and then requires
//! the matching end marker. Payload bytes may therefore take any value;
//! only instruction bytes are constrained to avoid marker values.
//!
//! All multi-byte integers carried in payloads are Big Endian (see
//! [`crate::codec`]); that byte order is part of the wire contract.

use bytes::Bytes;

use crate::error::{PinwireError, Result};

use super::Frame;

/// Start marker of a Request frame.
pub const REQUEST_START: u8 = b'<';

/// End marker of a Request frame.
pub const REQUEST_END: u8 = b'>';

/// Start marker of a Response frame.
pub const RESPONSE_START: u8 = b'?';

/// End marker of a Response frame.
pub const RESPONSE_END: u8 = b'!';

/// Bytes of framing overhead around a Request payload.
pub const REQUEST_OVERHEAD: usize = 5;

/// Bytes of framing overhead around a Response payload.
pub const RESPONSE_OVERHEAD: usize = 4;

/// Instruction bytes of the reference firmware contract.
pub mod instructions {
    /// Host asks the peer for an analog pin reading (2-byte reply).
    pub const ANALOG_READ: u8 = b'a';
    /// Host sets an analog (PWM) pin level (empty acknowledgement reply).
    pub const ANALOG_WRITE: u8 = b'b';
    /// Host asks the peer for a digital pin reading (4-byte reply).
    pub const DIGITAL_READ: u8 = b'c';
    /// Host sets a digital pin level (empty acknowledgement reply).
    pub const DIGITAL_WRITE: u8 = b'd';
    /// Host sends text for the peer to display (empty acknowledgement reply).
    pub const PRINT: u8 = b'p';
    /// Peer pushes a line of text for the host to log.
    pub const LOG: u8 = b'l';
    /// Peer invokes a registered host function; payload byte 0 selects it.
    pub const FUNCTION_CALL: u8 = b'f';
}

/// The two frame kinds exchanged on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// A call: host to peer, or peer-initiated inbound call to the host.
    Request,
    /// The reply correlated to an earlier Request by its id byte.
    Response,
}

impl FrameKind {
    /// The start marker byte for this kind.
    #[inline]
    pub fn start_marker(self) -> u8 {
        match self {
            FrameKind::Request => REQUEST_START,
            FrameKind::Response => RESPONSE_START,
        }
    }

    /// The end marker byte for this kind.
    #[inline]
    pub fn end_marker(self) -> u8 {
        match self {
            FrameKind::Request => REQUEST_END,
            FrameKind::Response => RESPONSE_END,
        }
    }

    /// Classify a byte as a start marker, if it is one.
    #[inline]
    pub fn from_start_marker(byte: u8) -> Option<FrameKind> {
        match byte {
            REQUEST_START => Some(FrameKind::Request),
            RESPONSE_START => Some(FrameKind::Response),
            _ => None,
        }
    }
}

/// Check whether a byte is one of the four frame markers.
#[inline]
pub fn is_marker(byte: u8) -> bool {
    matches!(byte, REQUEST_START | REQUEST_END | RESPONSE_START | RESPONSE_END)
}

/// Validate that an instruction byte can be carried on the wire.
///
/// Instruction bytes share the byte position right after the length field
/// and must never equal a marker value.
pub fn validate_instruction(instruction: u8) -> Result<()> {
    if is_marker(instruction) {
        return Err(PinwireError::ReservedInstruction(instruction));
    }
    Ok(())
}

/// Encode a Request frame.
///
/// # Errors
///
/// `PayloadTooLarge` if the payload exceeds `max_payload`, or
/// `ReservedInstruction` if the instruction byte collides with a marker.
pub fn encode_request(
    id: u8,
    instruction: u8,
    payload: &[u8],
    max_payload: usize,
) -> Result<Vec<u8>> {
    validate_instruction(instruction)?;
    check_payload_len(payload.len(), max_payload)?;

    let mut buf = Vec::with_capacity(REQUEST_OVERHEAD + payload.len());
    buf.push(REQUEST_START);
    buf.push(id);
    buf.push(payload.len() as u8);
    buf.push(instruction);
    buf.extend_from_slice(payload);
    buf.push(REQUEST_END);
    Ok(buf)
}

/// Encode a Response frame.
///
/// # Errors
///
/// `PayloadTooLarge` if the payload exceeds `max_payload`.
pub fn encode_response(id: u8, payload: &[u8], max_payload: usize) -> Result<Vec<u8>> {
    check_payload_len(payload.len(), max_payload)?;

    let mut buf = Vec::with_capacity(RESPONSE_OVERHEAD + payload.len());
    buf.push(RESPONSE_START);
    buf.push(id);
    buf.push(payload.len() as u8);
    buf.extend_from_slice(payload);
    buf.push(RESPONSE_END);
    Ok(buf)
}

/// Decode the bytes collected between a start marker and its end marker.
///
/// Byte 0 is the id, byte 1 the declared length; for Request frames byte 2
/// is the instruction and the remainder the payload, for Response frames
/// the remainder starting at byte 2 is the payload directly.
///
/// # Errors
///
/// `MalformedFrame` if the body is shorter than the fixed header or the
/// declared length does not match the received byte count, and
/// `RequestIdOutOfRange` if the id does not fit the pool.
pub fn decode_body(kind: FrameKind, body: &[u8], max_requests: u8) -> Result<Frame> {
    let header_len = match kind {
        FrameKind::Request => 3,
        FrameKind::Response => 2,
    };
    if body.len() < header_len {
        return Err(PinwireError::MalformedFrame("body shorter than frame header"));
    }

    let id = body[0];
    if id >= max_requests {
        return Err(PinwireError::RequestIdOutOfRange { id, max: max_requests });
    }

    let declared = body[1] as usize;
    let payload = &body[header_len..];
    if declared != payload.len() {
        return Err(PinwireError::MalformedFrame(
            "declared length does not match received bytes",
        ));
    }

    let instruction = match kind {
        FrameKind::Request => Some(body[2]),
        FrameKind::Response => None,
    };

    Ok(Frame {
        kind,
        id,
        instruction,
        payload: Bytes::copy_from_slice(payload),
    })
}

fn check_payload_len(len: usize, max_payload: usize) -> Result<()> {
    // The length field is a single byte; the configured maximum can only
    // tighten that bound.
    let max = max_payload.min(u8::MAX as usize);
    if len > max {
        return Err(PinwireError::PayloadTooLarge { len, max });
    }
    Ok(())
}
