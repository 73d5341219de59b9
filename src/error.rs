//! Error types for the proxy.
//!
//! [`Error`] covers the failure modes of the request pipeline. Malformed
//! client datagrams surface as [`Error::Malformed`] and are dropped silently
//! by the front end; [`Error::Timeout`] is the backend client's signal to
//! synthesize a resourceUnavailable response; [`Error::Bind`] is fatal at
//! startup.

use std::net::SocketAddr;
use std::time::Duration;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a datagram fails to parse as an SNMPv2c message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Expected a different tag byte.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Data ended before a complete field.
    TruncatedData,
    /// A length field with an unexpected value.
    InvalidLength,
    /// Long-form length with more octets than fit a u64.
    LengthTooLong { octets: usize },
    /// A length field that must be nonzero was zero.
    EmptyContent,
    /// Version field is not SNMPv2c.
    UnsupportedVersion,
    /// PDU tag is none of GetRequest/GetNextRequest/GetResponse/GetBulkRequest.
    UnknownPduType(u8),
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{:02X}, got 0x{:02X}", expected, actual)
            }
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::InvalidLength => write!(f, "invalid length encoding"),
            Self::LengthTooLong { octets } => {
                write!(f, "length encoding too long ({} octets)", octets)
            }
            Self::EmptyContent => write!(f, "zero-length content"),
            Self::UnsupportedVersion => write!(f, "not an SNMPv2c message"),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{:02X}", t),
        }
    }
}

/// The error type for all proxy operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Could not bind the listening socket. Fatal at startup.
    #[error("could not bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O error during network communication.
    #[error("I/O error{}: {source}", target.map(|t| format!(" communicating with {}", t)).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// Backend hostname did not resolve to a UDP endpoint.
    #[error("could not resolve backend host {host:?}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// No backend reply within the per-attempt deadline, all attempts used.
    #[error("no response from {host:?} after {elapsed:?} ({attempts} attempts)")]
    Timeout {
        host: String,
        elapsed: Duration,
        attempts: u32,
    },

    /// Datagram is not a parseable SNMPv2c message.
    #[error("malformed message at offset {offset}: {kind}")]
    Malformed { offset: usize, kind: DecodeErrorKind },

    /// Invalid configuration (e.g. an unparseable bind address).
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a malformed-message error.
    pub fn malformed(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::Malformed { offset, kind }
    }

    /// Create an I/O error with a known remote endpoint.
    pub fn io(target: SocketAddr, source: std::io::Error) -> Self {
        Self::Io {
            target: Some(target),
            source,
        }
    }

    /// True when all backend attempts expired without a reply.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
