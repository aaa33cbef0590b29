use std::io;

use thiserror::Error;

use crate::ofp_header::OfpHeader;

/// Failure to decode an OpenFlow message or one of its sub-structures.
#[derive(Debug, Error)]
pub enum OfpSerializationError {
    /// The buffer ended before a fixed-size field could be read.
    #[error("message truncated: {0}")]
    Truncated(#[from] io::Error),
    #[error("unsupported OpenFlow version {version:#04x}")]
    UnsupportedVersion { version: u8 },
    /// The header type code has no decoder.
    #[error("unsupported message type {code}")]
    UnsupportedMessage { code: u8 },
    #[error("unsupported multipart type {code}")]
    UnsupportedMultipart { code: u16 },
    /// A declared length is inconsistent with the enclosing buffer.
    #[error("invalid length {length} for {what}")]
    InvalidLength { what: &'static str, length: usize },
    #[error("unexpected value {value:#x} for {field}")]
    UnexpectedValue { field: &'static str, value: u64 },
}

/// OpenFlow Message
///
/// Version-agnostic API for handling OpenFlow messages at the byte-buffer level.
pub trait OfpMessage: Sized {
    /// Return the byte-size of an `OfpMessage`, header included.
    fn size_of(msg: &Self) -> usize;
    /// Create an `OfpHeader` for the given transaction id and OpenFlow message.
    fn header_of(xid: u32, msg: &Self) -> OfpHeader;
    /// Return a marshaled buffer containing an OpenFlow header and the message `msg`.
    fn marshal(xid: u32, msg: &Self) -> Vec<u8>;
    /// Returns a pair `(u32, OfpMessage)` of the transaction id and OpenFlow message parsed from
    /// the given OpenFlow header `header`, and buffer `buf` holding everything after the header.
    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Self), OfpSerializationError>;
}
