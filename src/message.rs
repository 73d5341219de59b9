//! SNMPv2c message codec.
//!
//! [`SnmpMessage`] is a structured view of one v2c datagram:
//! `SEQUENCE { version INTEGER, community OCTET STRING, pdu PDU }`. The proxy
//! only needs to reach the community string and the request id, so the PDU
//! body after the request id stays an opaque byte blob. The outer sequence
//! length and the PDU length are maintained through every mutation, which
//! makes [`SnmpMessage::serialize`] framing-correct without re-measuring.
//!
//! The community string doubles as the proxy's routing token. An `@` suffix
//! ("community index", used by agents for context addressing such as
//! per-VRF views) is split off at parse time and carried separately.

use bytes::{BufMut, Bytes, BytesMut};

use crate::ber::{decode_length, encode_length, encoded_len};
use crate::error::{DecodeErrorKind, Error, Result};

/// Outer message tag (SEQUENCE).
const SEQUENCE_TAG: u8 = 0x30;
/// INTEGER tag.
const INTEGER_TAG: u8 = 0x02;
/// OCTET STRING tag (community).
const OCTET_STRING_TAG: u8 = 0x04;
/// BER-encoded `version INTEGER = 1` (SNMPv2c).
const V2C_VERSION: [u8; 3] = [0x02, 0x01, 0x01];
/// Wire size of the request id field contents.
const REQUEST_ID_LEN: usize = 4;

/// SNMPv2c error-status `resourceUnavailable` (RFC 3416).
pub const RESOURCE_UNAVAILABLE: u8 = 0x0D;

/// PDU types the proxy understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    GetResponse = 0xA2,
    GetBulkRequest = 0xA5,
}

impl PduType {
    /// Create from tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::GetResponse),
            0xA5 => Some(Self::GetBulkRequest),
            _ => None,
        }
    }

    /// Get the tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// True for PDU types the front end accepts from clients.
    pub fn is_request(self) -> bool {
        !matches!(self, Self::GetResponse)
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::GetResponse => write!(f, "GetResponse"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
        }
    }
}

/// Structured view of one SNMPv2c datagram.
///
/// Produced by [`parse`](Self::parse); a parse error is the sole signal of a
/// malformed message. The request id is held as four opaque bytes and written
/// back verbatim, never normalized to host byte order — a cached response
/// must echo whatever bytes the asking client sent.
#[derive(Debug, Clone)]
pub struct SnmpMessage {
    /// Content length of the outer sequence.
    length: u64,
    /// Community string, with any `@` suffix split off.
    community: Bytes,
    /// The `@` suffix of the original community (including the `@`), empty
    /// if there was none.
    community_index: Bytes,
    pdu_type: PduType,
    /// Content length of the PDU.
    pdu_length: u64,
    request_id: [u8; 4],
    /// PDU bytes after the request id: error-status, error-index, varbinds.
    /// Offset 2 is the error-status octet in a standard v2c PDU.
    data: Bytes,
}

impl SnmpMessage {
    /// Parse a UDP payload into a message.
    ///
    /// Accepts exactly the v2c layout the proxy forwards: outer sequence,
    /// version 1, nonempty community, one of the four known PDU tags, and a
    /// four-byte request id. Everything after the request id is captured
    /// through the end of the buffer, ignoring the declared lengths.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 7 {
            return Err(Error::malformed(0, DecodeErrorKind::TruncatedData));
        }

        if buf[0] != SEQUENCE_TAG {
            return Err(Error::malformed(
                0,
                DecodeErrorKind::UnexpectedTag {
                    expected: SEQUENCE_TAG,
                    actual: buf[0],
                },
            ));
        }

        let mut pos = 1;
        let (length, consumed) = decode_length(&buf[pos..]).map_err(|e| at(e, pos))?;
        pos += consumed;
        if length == 0 {
            return Err(Error::malformed(pos, DecodeErrorKind::EmptyContent));
        }

        if buf.len() < pos + V2C_VERSION.len() || buf[pos..pos + V2C_VERSION.len()] != V2C_VERSION {
            return Err(Error::malformed(pos, DecodeErrorKind::UnsupportedVersion));
        }
        pos += V2C_VERSION.len();

        if pos >= buf.len() {
            return Err(Error::malformed(pos, DecodeErrorKind::TruncatedData));
        }
        if buf[pos] != OCTET_STRING_TAG {
            return Err(Error::malformed(
                pos,
                DecodeErrorKind::UnexpectedTag {
                    expected: OCTET_STRING_TAG,
                    actual: buf[pos],
                },
            ));
        }
        pos += 1;

        let (community_length, consumed) = decode_length(&buf[pos..]).map_err(|e| at(e, pos))?;
        pos += consumed;
        if community_length == 0 {
            return Err(Error::malformed(pos, DecodeErrorKind::EmptyContent));
        }
        let community_length = community_length as usize;

        if community_length > buf.len() - pos {
            return Err(Error::malformed(pos, DecodeErrorKind::TruncatedData));
        }
        let raw_community = Bytes::copy_from_slice(&buf[pos..pos + community_length]);
        pos += community_length;

        if pos >= buf.len() {
            return Err(Error::malformed(pos, DecodeErrorKind::TruncatedData));
        }
        let pdu_type = PduType::from_tag(buf[pos])
            .ok_or_else(|| Error::malformed(pos, DecodeErrorKind::UnknownPduType(buf[pos])))?;
        pos += 1;

        let (pdu_length, consumed) = decode_length(&buf[pos..]).map_err(|e| at(e, pos))?;
        pos += consumed;

        if buf.len() < pos + 2 {
            return Err(Error::malformed(pos, DecodeErrorKind::TruncatedData));
        }
        if buf[pos] != INTEGER_TAG {
            return Err(Error::malformed(
                pos,
                DecodeErrorKind::UnexpectedTag {
                    expected: INTEGER_TAG,
                    actual: buf[pos],
                },
            ));
        }
        pos += 1;
        if buf[pos] as usize != REQUEST_ID_LEN {
            return Err(Error::malformed(pos, DecodeErrorKind::InvalidLength));
        }
        pos += 1;

        if buf.len() < pos + REQUEST_ID_LEN {
            return Err(Error::malformed(pos, DecodeErrorKind::TruncatedData));
        }
        let mut request_id = [0u8; REQUEST_ID_LEN];
        request_id.copy_from_slice(&buf[pos..pos + REQUEST_ID_LEN]);
        pos += REQUEST_ID_LEN;

        let data = Bytes::copy_from_slice(&buf[pos..]);

        let mut message = Self {
            length,
            community: raw_community,
            community_index: Bytes::new(),
            pdu_type,
            pdu_length,
            request_id,
            data,
        };
        message.split_community();
        Ok(message)
    }

    /// Split the `@` suffix off the community and re-derive the outer length
    /// for the prefix-sized community that serialization will emit.
    fn split_community(&mut self) {
        let Some(at_pos) = self.community.iter().position(|&b| b == b'@') else {
            return;
        };
        let index = self.community.slice(at_pos..);
        let prefix = self.community.slice(..at_pos);
        let delta = community_overhead(&prefix) as i64 - community_overhead(&self.community) as i64;
        self.length = self.length.saturating_add_signed(delta);
        self.community = prefix;
        self.community_index = index;
    }

    /// Community string (post-split prefix).
    pub fn community(&self) -> &Bytes {
        &self.community
    }

    /// The `@` suffix of the original community, empty if absent.
    pub fn community_index(&self) -> &Bytes {
        &self.community_index
    }

    pub fn pdu_type(&self) -> PduType {
        self.pdu_type
    }

    /// The four request-id bytes exactly as received.
    pub fn request_id(&self) -> &[u8; 4] {
        &self.request_id
    }

    /// PDU bytes after the request id.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Content length of the outer sequence.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Content length of the PDU.
    pub fn pdu_length(&self) -> u64 {
        self.pdu_length
    }

    /// Replace the community, maintaining the outer length.
    pub fn set_community(&mut self, community: impl Into<Bytes>) {
        let community = community.into();
        let delta =
            community_overhead(&community) as i64 - community_overhead(&self.community) as i64;
        self.length = self.length.saturating_add_signed(delta);
        self.community = community;
    }

    /// Replace the PDU suffix, maintaining both the PDU length and the outer
    /// length (including any change in the BER overhead of the PDU length).
    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        let payload_delta = data.len() as i64 - self.data.len() as i64;
        let old_encoding = encoded_len(self.pdu_length) as i64;
        self.pdu_length = self.pdu_length.saturating_add_signed(payload_delta);
        let encoding_delta = encoded_len(self.pdu_length) as i64 - old_encoding;
        self.length = self.length.saturating_add_signed(payload_delta + encoding_delta);
        self.data = data;
    }

    /// Replace the PDU tag byte.
    pub fn set_pdu_type(&mut self, pdu_type: PduType) {
        self.pdu_type = pdu_type;
    }

    /// Overwrite the error-status octet (offset 2 of the PDU suffix).
    ///
    /// No-op when the suffix is too short to carry one; such a message never
    /// reached a backend in the first place.
    pub fn set_error(&mut self, error_status: u8) {
        if self.data.len() > 2 {
            let mut data = BytesMut::from(self.data.as_ref());
            data[2] = error_status;
            self.data = data.freeze();
        }
    }

    /// Serialize into a wire-ready payload.
    pub fn serialize(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(32 + self.community.len() + self.data.len());

        out.put_u8(SEQUENCE_TAG);
        let (buf, n) = encode_length(self.length);
        out.put_slice(&buf[..n]);

        out.put_slice(&V2C_VERSION);

        out.put_u8(OCTET_STRING_TAG);
        let (buf, n) = encode_length(self.community.len() as u64);
        out.put_slice(&buf[..n]);
        out.put_slice(&self.community);

        out.put_u8(self.pdu_type.tag());
        let (buf, n) = encode_length(self.pdu_length);
        out.put_slice(&buf[..n]);

        out.put_u8(INTEGER_TAG);
        out.put_u8(REQUEST_ID_LEN as u8);
        out.put_slice(&self.request_id);

        out.put_slice(&self.data);
        out.freeze()
    }
}

/// Wire footprint of a community string inside the outer sequence: the
/// content bytes plus the BER encoding of their count (the tag byte never
/// changes, so it stays out of the deltas).
fn community_overhead(community: &Bytes) -> u64 {
    community.len() as u64 + encoded_len(community.len() as u64) as u64
}

/// Rebase a decode error onto its position in the whole datagram.
fn at(error: Error, pos: usize) -> Error {
    match error {
        Error::Malformed { offset, kind } => Error::Malformed {
            offset: offset + pos,
            kind,
        },
        other => other,
    }
}
