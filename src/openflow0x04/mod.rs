//! OpenFlow 1.3 (wire version 0x04) message codec.
//!
//! Every message body and sub-structure implements a `parse` that consumes exactly its
//! declared length and a `marshal` that produces exactly `size_of` bytes. Multi-byte
//! integers are big-endian throughout; padding is consumed on decode and written as zero
//! on encode.
use std::io::{self, Cursor, Read};

use bytes::BufMut;

use crate::ofp_message::OfpSerializationError;

pub mod action;
pub mod control;
pub mod features;
pub mod flow;
pub mod message;
pub mod multipart;
pub mod oxm;
pub mod packet_io;

pub use self::action::{Action, Instruction};
pub use self::control::{AsyncConfig, ControllerRole, ErrorMsg, ErrorType, Experimenter, Hello,
                        HelloElement, Role, SwitchConfig};
pub use self::features::{Capabilities, PortConfig, PortDesc, PortFeatures, PortReason,
                         PortState, PortStatus, SwitchFeatures};
pub use self::flow::{FlowMod, FlowModCmd, FlowModFlags, FlowRemoved, FlowRemovedReason};
pub use self::message::Message;
pub use self::multipart::{MultipartReply, MultipartReplyBody, MultipartRequest,
                          MultipartRequestBody, MultipartType};
pub use self::oxm::{Mask, OxmField, Pattern};
pub use self::packet_io::{PacketIn, PacketInReason, PacketOut};

/// OpenFlow 1.3 message type codes, used by headers to identify meaning of the rest of a message.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MsgCode {
    Hello = 0,
    Error = 1,
    EchoReq = 2,
    EchoResp = 3,
    Experimenter = 4,
    FeaturesReq = 5,
    FeaturesResp = 6,
    GetConfigReq = 7,
    GetConfigResp = 8,
    SetConfig = 9,
    PacketIn = 10,
    FlowRemoved = 11,
    PortStatus = 12,
    PacketOut = 13,
    FlowMod = 14,
    GroupMod = 15,
    PortMod = 16,
    TableMod = 17,
    MultipartReq = 18,
    MultipartResp = 19,
    BarrierReq = 20,
    BarrierResp = 21,
    QueueGetConfigReq = 22,
    QueueGetConfigResp = 23,
    RoleReq = 24,
    RoleResp = 25,
    GetAsyncReq = 26,
    GetAsyncResp = 27,
    SetAsync = 28,
    MeterMod = 29,
}

impl MsgCode {
    /// Map a header type byte to its `MsgCode`.
    pub fn of_int(code: u8) -> Option<MsgCode> {
        let msg_code = match code {
            0 => MsgCode::Hello,
            1 => MsgCode::Error,
            2 => MsgCode::EchoReq,
            3 => MsgCode::EchoResp,
            4 => MsgCode::Experimenter,
            5 => MsgCode::FeaturesReq,
            6 => MsgCode::FeaturesResp,
            7 => MsgCode::GetConfigReq,
            8 => MsgCode::GetConfigResp,
            9 => MsgCode::SetConfig,
            10 => MsgCode::PacketIn,
            11 => MsgCode::FlowRemoved,
            12 => MsgCode::PortStatus,
            13 => MsgCode::PacketOut,
            14 => MsgCode::FlowMod,
            15 => MsgCode::GroupMod,
            16 => MsgCode::PortMod,
            17 => MsgCode::TableMod,
            18 => MsgCode::MultipartReq,
            19 => MsgCode::MultipartResp,
            20 => MsgCode::BarrierReq,
            21 => MsgCode::BarrierResp,
            22 => MsgCode::QueueGetConfigReq,
            23 => MsgCode::QueueGetConfigResp,
            24 => MsgCode::RoleReq,
            25 => MsgCode::RoleResp,
            26 => MsgCode::GetAsyncReq,
            27 => MsgCode::GetAsyncResp,
            28 => MsgCode::SetAsync,
            29 => MsgCode::MeterMod,
            _ => return None,
        };
        Some(msg_code)
    }
}

/// Common API for message bodies implementing OpenFlow Message Codes (see `MsgCode` enum).
pub trait MessageType: Sized {
    /// Return the byte-size of a message body, header excluded.
    fn size_of(&self) -> usize;
    /// Parse a body buffer into a message.
    fn parse(buf: &[u8]) -> Result<Self, OfpSerializationError>;
    /// Marshal a message body into a `u8` buffer.
    fn marshal(&self, bytes: &mut Vec<u8>);
}

pub(crate) type Reader<'a> = Cursor<&'a [u8]>;

fn truncated() -> OfpSerializationError {
    OfpSerializationError::Truncated(io::ErrorKind::UnexpectedEof.into())
}

/// Bytes left unread in `bytes`.
pub(crate) fn remaining(bytes: &Reader) -> usize {
    bytes.get_ref().len().saturating_sub(bytes.position() as usize)
}

/// Advance past `n` bytes of padding.
pub(crate) fn skip(bytes: &mut Reader, n: usize) -> Result<(), OfpSerializationError> {
    if remaining(bytes) < n {
        return Err(truncated());
    }
    bytes.set_position(bytes.position() + n as u64);
    Ok(())
}

/// Borrow the next `n` bytes of the underlying buffer and advance past them.
pub(crate) fn take<'a>(bytes: &mut Reader<'a>, n: usize) -> Result<&'a [u8], OfpSerializationError> {
    if remaining(bytes) < n {
        return Err(truncated());
    }
    let buf: &'a [u8] = *bytes.get_ref();
    let start = bytes.position() as usize;
    bytes.set_position((start + n) as u64);
    Ok(&buf[start..start + n])
}

/// Everything not yet consumed.
pub(crate) fn rest<'a>(bytes: &mut Reader<'a>) -> &'a [u8] {
    let n = remaining(bytes);
    let buf: &'a [u8] = *bytes.get_ref();
    let start = bytes.position() as usize;
    bytes.set_position((start + n) as u64);
    &buf[start..]
}

pub(crate) fn read_array<const N: usize>(bytes: &mut Reader) -> Result<[u8; N], OfpSerializationError> {
    let mut arr = [0; N];
    bytes.read_exact(&mut arr)?;
    Ok(arr)
}

/// Read a NUL-padded fixed-width string.
pub(crate) fn read_string<const N: usize>(bytes: &mut Reader) -> Result<String, OfpSerializationError> {
    let arr = read_array::<N>(bytes)?;
    let end = arr.iter().position(|b| *b == 0).unwrap_or(N);
    Ok(String::from_utf8_lossy(&arr[..end]).into_owned())
}

/// Write `s` NUL-padded (and truncated) to `width` bytes.
pub(crate) fn put_string(bytes: &mut Vec<u8>, s: &str, width: usize) {
    let raw = s.as_bytes();
    let n = raw.len().min(width);
    bytes.put_slice(&raw[..n]);
    bytes.put_bytes(0, width - n);
}

/// Guard a declared sub-record length against its fixed minimum and the bytes left.
pub(crate) fn check_len(what: &'static str,
                        length: usize,
                        min: usize,
                        available: usize)
                        -> Result<(), OfpSerializationError> {
    if length < min || length > available {
        Err(OfpSerializationError::InvalidLength { what, length })
    } else {
        Ok(())
    }
}

/// Port behavior.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PseudoPort {
    PhysicalPort(u32),
    InPort,
    Table,
    Normal,
    Flood,
    AllPorts,
    Controller,
    Local,
    Any,
}

#[repr(u32)]
enum OfpPort {
    OFPPMax = 0xffffff00,
    OFPPInPort = 0xfffffff8,
    OFPPTable = 0xfffffff9,
    OFPPNormal = 0xfffffffa,
    OFPPFlood = 0xfffffffb,
    OFPPAll = 0xfffffffc,
    OFPPController = 0xfffffffd,
    OFPPLocal = 0xfffffffe,
    OFPPAny = 0xffffffff,
}

impl PseudoPort {
    pub fn of_int(p: u32) -> Result<PseudoPort, OfpSerializationError> {
        let port = match p {
            p if p == (OfpPort::OFPPInPort as u32) => PseudoPort::InPort,
            p if p == (OfpPort::OFPPTable as u32) => PseudoPort::Table,
            p if p == (OfpPort::OFPPNormal as u32) => PseudoPort::Normal,
            p if p == (OfpPort::OFPPFlood as u32) => PseudoPort::Flood,
            p if p == (OfpPort::OFPPAll as u32) => PseudoPort::AllPorts,
            p if p == (OfpPort::OFPPController as u32) => PseudoPort::Controller,
            p if p == (OfpPort::OFPPLocal as u32) => PseudoPort::Local,
            p if p == (OfpPort::OFPPAny as u32) => PseudoPort::Any,
            p if p <= (OfpPort::OFPPMax as u32) => PseudoPort::PhysicalPort(p),
            p => {
                return Err(OfpSerializationError::UnexpectedValue {
                    field: "port",
                    value: p as u64,
                })
            }
        };
        Ok(port)
    }

    pub fn to_int(self) -> u32 {
        match self {
            PseudoPort::PhysicalPort(p) => p,
            PseudoPort::InPort => OfpPort::OFPPInPort as u32,
            PseudoPort::Table => OfpPort::OFPPTable as u32,
            PseudoPort::Normal => OfpPort::OFPPNormal as u32,
            PseudoPort::Flood => OfpPort::OFPPFlood as u32,
            PseudoPort::AllPorts => OfpPort::OFPPAll as u32,
            PseudoPort::Controller => OfpPort::OFPPController as u32,
            PseudoPort::Local => OfpPort::OFPPLocal as u32,
            PseudoPort::Any => OfpPort::OFPPAny as u32,
        }
    }

    fn marshal(self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.to_int())
    }
}

/// Wildcard group id used by flow-mod and stats requests.
pub const OFPG_ANY: u32 = 0xffffffff;
/// Wildcard table id used by flow deletes and stats requests.
pub const OFPTT_ALL: u8 = 0xff;
/// Output `max_len` asking the switch to send the whole packet to the controller.
pub const OFPCML_NO_BUFFER: u16 = 0xffff;

/// How long before a flow entry expires.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Timeout {
    Permanent,
    ExpiresAfter(u16),
}

impl Timeout {
    pub fn of_int(tm: u16) -> Timeout {
        match tm {
            0 => Timeout::Permanent,
            d => Timeout::ExpiresAfter(d),
        }
    }

    pub fn to_int(self) -> u16 {
        match self {
            Timeout::Permanent => 0,
            Timeout::ExpiresAfter(d) => d,
        }
    }
}

const OFP_NO_BUFFER: u32 = 0xffffffff;

/// The data associated with a packet exchanged between switch and controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Payload {
    Buffered(u32, Vec<u8>),
    NotBuffered(Vec<u8>),
}

impl Payload {
    pub fn from_parts(buffer_id: u32, data: Vec<u8>) -> Payload {
        match buffer_id {
            OFP_NO_BUFFER => Payload::NotBuffered(data),
            n => Payload::Buffered(n, data),
        }
    }

    pub fn buffer_id(&self) -> u32 {
        match *self {
            Payload::Buffered(n, _) => n,
            Payload::NotBuffered(_) => OFP_NO_BUFFER,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        match *self {
            Payload::Buffered(_, ref buf) |
            Payload::NotBuffered(ref buf) => buf,
        }
    }

    pub fn size_of(&self) -> usize {
        self.bytes().len()
    }
}
