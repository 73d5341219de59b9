//! BER length encoding and decoding.
//!
//! Length encoding follows X.690 Section 8.1.3:
//! - Short form: single byte, bit 8 = 0, value 0-127
//! - Long form: initial byte (bit 8 = 1, bits 7-1 = octet count), followed
//!   by that many big-endian value octets
//! - A zero octet count (the 0x80 byte) decodes as value 0, one byte
//!   consumed; callers that need a nonzero length guard for it themselves
//!
//! These octets frame both the outer message sequence and the community
//! string inside it, and they are the only numeric encoding the proxy
//! touches; PDU contents beyond the request id are opaque.

use crate::error::{DecodeErrorKind, Error, Result};

/// Largest number of value octets accepted in long form (width of u64).
const MAX_LENGTH_OCTETS: usize = 8;

/// Decode a BER length, returning `(value, octets_consumed)`.
pub fn decode_length(data: &[u8]) -> Result<(u64, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::malformed(0, DecodeErrorKind::TruncatedData));
    };

    if first & 0x80 == 0 {
        // Short form
        return Ok((u64::from(first), 1));
    }

    let num_octets = (first & 0x7F) as usize;

    if num_octets > MAX_LENGTH_OCTETS {
        return Err(Error::malformed(
            0,
            DecodeErrorKind::LengthTooLong { octets: num_octets },
        ));
    }

    if data.len() < 1 + num_octets {
        return Err(Error::malformed(0, DecodeErrorKind::TruncatedData));
    }

    let mut value: u64 = 0;
    for &byte in &data[1..1 + num_octets] {
        value = (value << 8) | u64::from(byte);
    }

    Ok((value, 1 + num_octets))
}

/// Encode a length value. Returns the octets in a fixed buffer plus the
/// number of valid bytes.
///
/// Uses short form for values below 128, minimal long form otherwise
/// (leading zero octets suppressed).
pub fn encode_length(value: u64) -> ([u8; 9], usize) {
    let mut buf = [0u8; 9];

    if value < 0x80 {
        buf[0] = value as u8;
        return (buf, 1);
    }

    let significant = MAX_LENGTH_OCTETS - value.leading_zeros() as usize / 8;
    buf[0] = 0x80 | significant as u8;
    for i in 0..significant {
        buf[1 + i] = (value >> (8 * (significant - 1 - i))) as u8;
    }
    (buf, 1 + significant)
}

/// Number of octets `encode_length` produces for a value.
///
/// The message mutators use this to maintain the outer length when an inner
/// length field crosses the short/long form boundary.
pub fn encoded_len(value: u64) -> usize {
    if value < 0x80 {
        1
    } else {
        1 + MAX_LENGTH_OCTETS - value.leading_zeros() as usize / 8
    }
}
