use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::ofp_message::OfpSerializationError;
use crate::openflow0x04::MsgCode;

/// Version byte carried by every OpenFlow 1.3 message.
pub const OPENFLOW_0_04_VERSION: u8 = 0x04;

/// Largest message, header included, whose size fits the 16-bit length field.
pub const OFP_MAX_MESSAGE_LEN: usize = u16::MAX as usize;

/// OpenFlow Header
///
/// The first fields of every OpenFlow message, no matter the protocol version.
/// This is parsed to determine version and length of the remaining message, so that
/// it can be properly handled.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OfpHeader {
    version: u8,
    typ: u8,
    length: u16,
    xid: u32,
}

impl OfpHeader {
    /// Create an `OfpHeader` out of the arguments.
    pub fn new(version: u8, typ: u8, length: u16, xid: u32) -> OfpHeader {
        OfpHeader {
            version,
            typ,
            length,
            xid,
        }
    }

    /// Return the byte-size of an `OfpHeader`.
    pub const fn size() -> usize {
        8
    }

    /// Fills a message buffer with the header fields of an `OfpHeader`.
    pub fn marshal(bytes: &mut Vec<u8>, header: &OfpHeader) {
        bytes.put_u8(header.version);
        bytes.put_u8(header.typ);
        bytes.put_u16(header.length);
        bytes.put_u32(header.xid);
    }

    /// Reads an `OfpHeader` from the first eight bytes of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let header = OfpHeader {
            version: bytes.read_u8()?,
            typ: bytes.read_u8()?,
            length: bytes.read_u16::<BigEndian>()?,
            xid: bytes.read_u32::<BigEndian>()?,
        };
        if header.length() < Self::size() {
            return Err(OfpSerializationError::InvalidLength {
                what: "header",
                length: header.length(),
            });
        }
        Ok(header)
    }

    /// Return the `version` field of a header.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Return the raw type byte of a header.
    pub fn typ(&self) -> u8 {
        self.typ
    }

    /// Return the OpenFlow message type code of a header, if the byte names a known code.
    pub fn type_code(&self) -> Option<MsgCode> {
        MsgCode::of_int(self.typ)
    }

    /// Return the `length` field of a header. Includes the length of the header itself.
    pub fn length(&self) -> usize {
        self.length as usize
    }

    /// Return the `xid` field of a header, the transaction id associated with this packet.
    ///  Replies use the same id to facilitate pairing.
    pub fn xid(&self) -> u32 {
        self.xid
    }
}
