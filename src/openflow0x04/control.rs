use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::bits::{pad8, test_bit};
use crate::ofp_message::OfpSerializationError;
use super::{check_len, remaining, rest, skip, take, MessageType};

const OFPHET_VERSIONBITMAP: u16 = 1;

/// An element of a Hello message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HelloElement {
    /// Bitmap words; bit `n` of the bitmap set means wire version `n` is supported.
    VersionBitmap(Vec<u32>),
    Unknown { typ: u16, body: Vec<u8> },
}

impl HelloElement {
    fn body_len(&self) -> usize {
        match *self {
            HelloElement::VersionBitmap(ref words) => 4 * words.len(),
            HelloElement::Unknown { ref body, .. } => body.len(),
        }
    }

    fn size_of(&self) -> usize {
        let len = 4 + self.body_len();
        len + pad8(len)
    }
}

/// Hello, the first message each side sends on a new connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hello {
    pub elements: Vec<HelloElement>,
}

impl Hello {
    /// A hello advertising exactly `version` through a version bitmap.
    pub fn with_version_bitmap(version: u8) -> Hello {
        let mut words = vec![0u32; version as usize / 32 + 1];
        words[version as usize / 32] |= 1 << (version % 32);
        Hello { elements: vec![HelloElement::VersionBitmap(words)] }
    }

    /// Whether the peer's version bitmap lists `version`. `None` without a bitmap, in which
    /// case the header version is authoritative.
    pub fn supports(&self, version: u8) -> Option<bool> {
        self.elements.iter().find_map(|e| match *e {
            HelloElement::VersionBitmap(ref words) => {
                let word = words.get(version as usize / 32).copied().unwrap_or(0);
                Some(test_bit((version % 32) as u64, word as u64))
            }
            HelloElement::Unknown { .. } => None,
        })
    }
}

impl MessageType for Hello {
    fn size_of(&self) -> usize {
        self.elements.iter().map(HelloElement::size_of).sum()
    }

    fn parse(buf: &[u8]) -> Result<Hello, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let mut elements = vec![];
        while remaining(&bytes) > 0 {
            let typ = bytes.read_u16::<BigEndian>()?;
            let len = bytes.read_u16::<BigEndian>()? as usize;
            check_len("hello element", len, 4, remaining(&bytes) + 4)?;
            let mut body = Cursor::new(take(&mut bytes, len - 4)?);
            let element = match typ {
                OFPHET_VERSIONBITMAP if (len - 4) % 4 == 0 => {
                    let mut words = vec![];
                    while remaining(&body) > 0 {
                        words.push(body.read_u32::<BigEndian>()?);
                    }
                    HelloElement::VersionBitmap(words)
                }
                _ => {
                    HelloElement::Unknown {
                        typ,
                        body: rest(&mut body).to_vec(),
                    }
                }
            };
            let pad = pad8(len).min(remaining(&bytes));
            skip(&mut bytes, pad)?;
            elements.push(element);
        }
        Ok(Hello { elements })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        for element in &self.elements {
            let len = 4 + element.body_len();
            match *element {
                HelloElement::VersionBitmap(ref words) => {
                    bytes.put_u16(OFPHET_VERSIONBITMAP);
                    bytes.put_u16(len as u16);
                    for w in words {
                        bytes.put_u32(*w);
                    }
                }
                HelloElement::Unknown { typ, ref body } => {
                    bytes.put_u16(typ);
                    bytes.put_u16(len as u16);
                    bytes.put_slice(body);
                }
            }
            bytes.put_bytes(0, pad8(len));
        }
    }
}

/// Error classes reported by a switch.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorType {
    HelloFailed = 0,
    BadRequest = 1,
    BadAction = 2,
    BadInstruction = 3,
    BadMatch = 4,
    FlowModFailed = 5,
    GroupModFailed = 6,
    PortModFailed = 7,
    TableModFailed = 8,
    QueueOpFailed = 9,
    SwitchConfigFailed = 10,
    RoleRequestFailed = 11,
    MeterModFailed = 12,
    TableFeaturesFailed = 13,
    Experimenter = 0xffff,
}

impl ErrorType {
    pub fn of_int(typ: u16) -> Option<ErrorType> {
        let t = match typ {
            0 => ErrorType::HelloFailed,
            1 => ErrorType::BadRequest,
            2 => ErrorType::BadAction,
            3 => ErrorType::BadInstruction,
            4 => ErrorType::BadMatch,
            5 => ErrorType::FlowModFailed,
            6 => ErrorType::GroupModFailed,
            7 => ErrorType::PortModFailed,
            8 => ErrorType::TableModFailed,
            9 => ErrorType::QueueOpFailed,
            10 => ErrorType::SwitchConfigFailed,
            11 => ErrorType::RoleRequestFailed,
            12 => ErrorType::MeterModFailed,
            13 => ErrorType::TableFeaturesFailed,
            0xffff => ErrorType::Experimenter,
            _ => return None,
        };
        Some(t)
    }
}

/// `OFPHFC_INCOMPATIBLE`: no common version.
pub const OFPHFC_INCOMPATIBLE: u16 = 0;

/// Error message. `data` usually holds the start of the offending request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorMsg {
    pub typ: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl ErrorMsg {
    /// Hello-failed/incompatible with an ASCII explanation, as sent when negotiation fails.
    pub fn hello_incompatible(reason: &str) -> ErrorMsg {
        ErrorMsg {
            typ: ErrorType::HelloFailed as u16,
            code: OFPHFC_INCOMPATIBLE,
            data: reason.as_bytes().to_vec(),
        }
    }

    pub fn error_type(&self) -> Option<ErrorType> {
        ErrorType::of_int(self.typ)
    }
}

impl MessageType for ErrorMsg {
    fn size_of(&self) -> usize {
        4 + self.data.len()
    }

    fn parse(buf: &[u8]) -> Result<ErrorMsg, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let typ = bytes.read_u16::<BigEndian>()?;
        let code = bytes.read_u16::<BigEndian>()?;
        Ok(ErrorMsg {
            typ,
            code,
            data: rest(&mut bytes).to_vec(),
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.typ);
        bytes.put_u16(self.code);
        bytes.put_slice(&self.data);
    }
}

/// Switch configuration, as returned by get-config and applied by set-config.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl MessageType for SwitchConfig {
    fn size_of(&self) -> usize {
        4
    }

    fn parse(buf: &[u8]) -> Result<SwitchConfig, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        Ok(SwitchConfig {
            flags: bytes.read_u16::<BigEndian>()?,
            miss_send_len: bytes.read_u16::<BigEndian>()?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.flags);
        bytes.put_u16(self.miss_send_len);
    }
}

/// Controller role relative to the other controllers of a switch.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerRole {
    NoChange = 0,
    Equal = 1,
    Master = 2,
    Slave = 3,
}

impl ControllerRole {
    fn of_int(role: u32) -> Result<ControllerRole, OfpSerializationError> {
        match role {
            0 => Ok(ControllerRole::NoChange),
            1 => Ok(ControllerRole::Equal),
            2 => Ok(ControllerRole::Master),
            3 => Ok(ControllerRole::Slave),
            r => {
                Err(OfpSerializationError::UnexpectedValue {
                    field: "controller role",
                    value: r as u64,
                })
            }
        }
    }
}

/// Body of role request and role reply.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub role: ControllerRole,
    pub generation_id: u64,
}

impl MessageType for Role {
    fn size_of(&self) -> usize {
        16
    }

    fn parse(buf: &[u8]) -> Result<Role, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let role = ControllerRole::of_int(bytes.read_u32::<BigEndian>()?)?;
        skip(&mut bytes, 4)?;
        Ok(Role {
            role,
            generation_id: bytes.read_u64::<BigEndian>()?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.role as u32);
        bytes.put_bytes(0, 4);
        bytes.put_u64(self.generation_id);
    }
}

/// Asynchronous message filters; index 0 applies in master/equal role, 1 in slave role.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AsyncConfig {
    pub packet_in_mask: [u32; 2],
    pub port_status_mask: [u32; 2],
    pub flow_removed_mask: [u32; 2],
}

impl MessageType for AsyncConfig {
    fn size_of(&self) -> usize {
        24
    }

    fn parse(buf: &[u8]) -> Result<AsyncConfig, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let mut pair = || -> Result<[u32; 2], OfpSerializationError> {
            Ok([bytes.read_u32::<BigEndian>()?, bytes.read_u32::<BigEndian>()?])
        };
        Ok(AsyncConfig {
            packet_in_mask: pair()?,
            port_status_mask: pair()?,
            flow_removed_mask: pair()?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        for mask in [self.packet_in_mask, self.port_status_mask, self.flow_removed_mask] {
            bytes.put_u32(mask[0]);
            bytes.put_u32(mask[1]);
        }
    }
}

/// Vendor extension message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Experimenter {
    pub experimenter: u32,
    pub exp_type: u32,
    pub data: Vec<u8>,
}

impl MessageType for Experimenter {
    fn size_of(&self) -> usize {
        8 + self.data.len()
    }

    fn parse(buf: &[u8]) -> Result<Experimenter, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let experimenter = bytes.read_u32::<BigEndian>()?;
        let exp_type = bytes.read_u32::<BigEndian>()?;
        Ok(Experimenter {
            experimenter,
            exp_type,
            data: rest(&mut bytes).to_vec(),
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.experimenter);
        bytes.put_u32(self.exp_type);
        bytes.put_slice(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_version_bitmap_round_trip() {
        // OVS advertising 1.0 and 1.3
        let wire = [0x00, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x12];
        let hello = Hello::parse(&wire).unwrap();
        assert_eq!(hello.elements, vec![HelloElement::VersionBitmap(vec![0x12])]);
        assert_eq!(hello.supports(0x04), Some(true));
        assert_eq!(hello.supports(0x05), Some(false));
        let mut bytes = vec![];
        hello.marshal(&mut bytes);
        assert_eq!(bytes, wire);
        assert_eq!(hello.size_of(), wire.len());
    }

    #[test]
    fn bare_hello_has_no_opinion() {
        let hello = Hello::parse(&[]).unwrap();
        assert_eq!(hello.supports(0x04), None);
        assert_eq!(Hello::with_version_bitmap(0x04).supports(0x04), Some(true));
    }

    #[test]
    fn unknown_hello_element_is_padded() {
        let hello = Hello {
            elements: vec![HelloElement::Unknown { typ: 9, body: vec![1, 2, 3] }],
        };
        let mut bytes = vec![];
        hello.marshal(&mut bytes);
        assert_eq!(bytes, [0x00, 0x09, 0x00, 0x07, 1, 2, 3, 0]);
        assert_eq!(Hello::parse(&bytes).unwrap(), hello);
    }

    #[test]
    fn element_after_padding_is_read() {
        let wire = [0x00, 0x09, 0x00, 0x05, 0xaa, 0, 0, 0,
                    0x00, 0x01, 0x00, 0x08, 0x00, 0x00, 0x00, 0x10];
        let hello = Hello::parse(&wire).unwrap();
        assert_eq!(hello.elements,
                   vec![HelloElement::Unknown { typ: 9, body: vec![0xaa] },
                        HelloElement::VersionBitmap(vec![0x10])]);
        assert_eq!(hello.supports(0x04), Some(true));
        assert_eq!(hello.size_of(), wire.len());
    }

    #[test]
    fn error_keeps_trailing_data() {
        let wire = [0x00, 0x01, 0x00, 0x06, 0x04, 0x0e, 0x00, 0x48];
        let err = ErrorMsg::parse(&wire).unwrap();
        assert_eq!(err.error_type(), Some(ErrorType::BadRequest));
        assert_eq!(err.code, 6);
        assert_eq!(err.data, vec![0x04, 0x0e, 0x00, 0x48]);
        let mut bytes = vec![];
        err.marshal(&mut bytes);
        assert_eq!(bytes, wire);
    }

    #[test]
    fn role_rejects_unknown_roles() {
        let mut wire = vec![0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9];
        assert_eq!(Role::parse(&wire).unwrap(),
                   Role { role: ControllerRole::Master, generation_id: 9 });
        wire[3] = 7;
        assert!(Role::parse(&wire).is_err());
    }
}
