//! Protocol module - wire format, framing, and frame types.
//!
//! Implements the byte-level protocol of the serial link:
//! - marker-delimited frame encoding/decoding
//! - incremental frame reassembly with resynchronization
//! - the `Frame` struct with typed accessors

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    decode_body, encode_request, encode_response, instructions, is_marker, validate_instruction,
    FrameKind, REQUEST_END, REQUEST_OVERHEAD, REQUEST_START, RESPONSE_END, RESPONSE_OVERHEAD,
    RESPONSE_START,
};
