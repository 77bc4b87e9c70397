//! Payload codec - explicit Big Endian numbers on the wire.
//!
//! The peer composes multi-byte integers most-significant-byte first, and
//! this module is the single place that byte order is written down. Every
//! integer, short and bool payload crosses the wire in this format
//! regardless of host word size or endianness; raw native-width
//! reinterpretation is never used.
//!
//! # Example
//!
//! ```
//! use pinwire::codec::{FromPayload, WireCodec};
//! use bytes::Bytes;
//!
//! let bytes = WireCodec::encode_i16(42);
//! assert_eq!(bytes, [0x00, 0x2A]);
//!
//! let value = i16::from_payload(&Bytes::copy_from_slice(&bytes)).unwrap();
//! assert_eq!(value, 42);
//! ```

use bytes::Bytes;

use crate::error::{PinwireError, Result};

/// Big Endian wire codec for numeric payloads.
pub struct WireCodec;

impl WireCodec {
    /// Encode a signed 16-bit value.
    #[inline]
    pub fn encode_i16(value: i16) -> [u8; 2] {
        value.to_be_bytes()
    }

    /// Encode a signed 32-bit value.
    #[inline]
    pub fn encode_i32(value: i32) -> [u8; 4] {
        value.to_be_bytes()
    }

    /// Encode an unsigned 16-bit value.
    #[inline]
    pub fn encode_u16(value: u16) -> [u8; 2] {
        value.to_be_bytes()
    }

    /// Decode a signed 16-bit value.
    pub fn decode_i16(bytes: &[u8]) -> Result<i16> {
        Ok(i16::from_be_bytes(exact(bytes)?))
    }

    /// Decode a signed 32-bit value.
    pub fn decode_i32(bytes: &[u8]) -> Result<i32> {
        Ok(i32::from_be_bytes(exact(bytes)?))
    }

    /// Decode an unsigned 16-bit value.
    pub fn decode_u16(bytes: &[u8]) -> Result<u16> {
        Ok(u16::from_be_bytes(exact(bytes)?))
    }
}

fn exact<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        PinwireError::Decode(format!("expected {N} payload bytes, got {}", bytes.len()))
    })
}

/// Types a response payload can be decoded into.
///
/// This is the `decode` half of a call: the correlator hands the filled
/// slot's bytes to `from_payload` and returns the typed result.
pub trait FromPayload: Sized {
    /// Decode the payload bytes.
    fn from_payload(bytes: &Bytes) -> Result<Self>;
}

/// Acknowledgement-only replies; the payload is ignored.
impl FromPayload for () {
    fn from_payload(_bytes: &Bytes) -> Result<Self> {
        Ok(())
    }
}

impl FromPayload for u8 {
    fn from_payload(bytes: &Bytes) -> Result<Self> {
        let [b] = exact(bytes)?;
        Ok(b)
    }
}

/// One byte; zero is `false`, anything else is `true`.
impl FromPayload for bool {
    fn from_payload(bytes: &Bytes) -> Result<Self> {
        let [b] = exact::<1>(bytes)?;
        Ok(b != 0)
    }
}

impl FromPayload for i16 {
    fn from_payload(bytes: &Bytes) -> Result<Self> {
        WireCodec::decode_i16(bytes)
    }
}

impl FromPayload for u16 {
    fn from_payload(bytes: &Bytes) -> Result<Self> {
        WireCodec::decode_u16(bytes)
    }
}

impl FromPayload for i32 {
    fn from_payload(bytes: &Bytes) -> Result<Self> {
        WireCodec::decode_i32(bytes)
    }
}

/// Raw payload bytes, zero-copy.
impl FromPayload for Bytes {
    fn from_payload(bytes: &Bytes) -> Result<Self> {
        Ok(bytes.clone())
    }
}

/// UTF-8 text payload.
impl FromPayload for String {
    fn from_payload(bytes: &Bytes) -> Result<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| PinwireError::Decode(format!("invalid UTF-8 payload: {e}")))
    }
}
