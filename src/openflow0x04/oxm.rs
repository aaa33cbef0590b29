use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::bits::pad8;
use crate::ofp_message::OfpSerializationError;
use super::{check_len, read_array, remaining, skip, take, Reader};

/// Ethernet hardware address, most significant byte first.
pub type MacAddr = [u8; 6];

const OFPXMC_OPENFLOW_BASIC: u16 = 0x8000;
const OFPMT_OXM: u16 = 1;

#[repr(u8)]
enum OxmCode {
    InPort = 0,
    InPhyPort = 1,
    Metadata = 2,
    EthDst = 3,
    EthSrc = 4,
    EthType = 5,
    VlanVid = 6,
    VlanPcp = 7,
    IpDscp = 8,
    IpEcn = 9,
    IpProto = 10,
    Ipv4Src = 11,
    Ipv4Dst = 12,
    TcpSrc = 13,
    TcpDst = 14,
    UdpSrc = 15,
    UdpDst = 16,
    Icmpv4Type = 19,
    Icmpv4Code = 20,
    ArpOp = 21,
    ArpSpa = 22,
    ArpTpa = 23,
    TunnelId = 38,
}

/// A value with an optional bitmask; bits clear in the mask are wildcarded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mask<T> {
    pub value: T,
    pub mask: Option<T>,
}

impl<T> Mask<T> {
    pub fn exact(value: T) -> Mask<T> {
        Mask { value, mask: None }
    }

    pub fn masked(value: T, mask: T) -> Mask<T> {
        Mask {
            value,
            mask: Some(mask),
        }
    }
}

trait OxmValue: Sized + Copy {
    const WIDTH: usize;
    fn put(self, bytes: &mut Vec<u8>);
    fn get(bytes: &mut Reader) -> Result<Self, OfpSerializationError>;
}

impl OxmValue for u8 {
    const WIDTH: usize = 1;
    fn put(self, bytes: &mut Vec<u8>) {
        bytes.put_u8(self)
    }
    fn get(bytes: &mut Reader) -> Result<Self, OfpSerializationError> {
        Ok(bytes.read_u8()?)
    }
}

impl OxmValue for u16 {
    const WIDTH: usize = 2;
    fn put(self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self)
    }
    fn get(bytes: &mut Reader) -> Result<Self, OfpSerializationError> {
        Ok(bytes.read_u16::<BigEndian>()?)
    }
}

impl OxmValue for u32 {
    const WIDTH: usize = 4;
    fn put(self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self)
    }
    fn get(bytes: &mut Reader) -> Result<Self, OfpSerializationError> {
        Ok(bytes.read_u32::<BigEndian>()?)
    }
}

impl OxmValue for u64 {
    const WIDTH: usize = 8;
    fn put(self, bytes: &mut Vec<u8>) {
        bytes.put_u64(self)
    }
    fn get(bytes: &mut Reader) -> Result<Self, OfpSerializationError> {
        Ok(bytes.read_u64::<BigEndian>()?)
    }
}

impl OxmValue for MacAddr {
    const WIDTH: usize = 6;
    fn put(self, bytes: &mut Vec<u8>) {
        bytes.put_slice(&self)
    }
    fn get(bytes: &mut Reader) -> Result<Self, OfpSerializationError> {
        read_array::<6>(bytes)
    }
}

impl<T: OxmValue> Mask<T> {
    fn width(&self) -> usize {
        match self.mask {
            Some(_) => 2 * T::WIDTH,
            None => T::WIDTH,
        }
    }

    fn put(&self, bytes: &mut Vec<u8>) {
        self.value.put(bytes);
        if let Some(mask) = self.mask {
            mask.put(bytes);
        }
    }
}

fn exact<T: OxmValue>(hasmask: bool, value: &[u8]) -> Option<T> {
    if hasmask || value.len() != T::WIDTH {
        return None;
    }
    T::get(&mut Cursor::new(value)).ok()
}

fn masked<T: OxmValue>(hasmask: bool, value: &[u8]) -> Option<Mask<T>> {
    let expected = if hasmask { 2 * T::WIDTH } else { T::WIDTH };
    if value.len() != expected {
        return None;
    }
    let mut bytes = Cursor::new(value);
    let v = T::get(&mut bytes).ok()?;
    let mask = if hasmask {
        Some(T::get(&mut bytes).ok()?)
    } else {
        None
    };
    Some(Mask { value: v, mask })
}

/// One OpenFlow Extensible Match TLV.
///
/// OpenFlow-basic fields with the expected width decode to typed variants. Anything else
/// (other classes, unlisted fields, masks on unmaskable fields) is kept verbatim in
/// `Unknown` so it re-encodes to the same bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OxmField {
    InPort(u32),
    InPhyPort(u32),
    Metadata(Mask<u64>),
    EthDst(Mask<MacAddr>),
    EthSrc(Mask<MacAddr>),
    EthType(u16),
    VlanVid(Mask<u16>),
    VlanPcp(u8),
    IpDscp(u8),
    IpEcn(u8),
    IpProto(u8),
    Ipv4Src(Mask<u32>),
    Ipv4Dst(Mask<u32>),
    TcpSrc(u16),
    TcpDst(u16),
    UdpSrc(u16),
    UdpDst(u16),
    Icmpv4Type(u8),
    Icmpv4Code(u8),
    ArpOp(u16),
    ArpSpa(Mask<u32>),
    ArpTpa(Mask<u32>),
    TunnelId(Mask<u64>),
    Unknown {
        class: u16,
        field: u8,
        hasmask: bool,
        value: Vec<u8>,
    },
}

impl OxmField {
    fn code(&self) -> (u16, u8, bool) {
        let basic = |code: OxmCode, hasmask: bool| (OFPXMC_OPENFLOW_BASIC, code as u8, hasmask);
        match *self {
            OxmField::InPort(_) => basic(OxmCode::InPort, false),
            OxmField::InPhyPort(_) => basic(OxmCode::InPhyPort, false),
            OxmField::Metadata(ref m) => basic(OxmCode::Metadata, m.mask.is_some()),
            OxmField::EthDst(ref m) => basic(OxmCode::EthDst, m.mask.is_some()),
            OxmField::EthSrc(ref m) => basic(OxmCode::EthSrc, m.mask.is_some()),
            OxmField::EthType(_) => basic(OxmCode::EthType, false),
            OxmField::VlanVid(ref m) => basic(OxmCode::VlanVid, m.mask.is_some()),
            OxmField::VlanPcp(_) => basic(OxmCode::VlanPcp, false),
            OxmField::IpDscp(_) => basic(OxmCode::IpDscp, false),
            OxmField::IpEcn(_) => basic(OxmCode::IpEcn, false),
            OxmField::IpProto(_) => basic(OxmCode::IpProto, false),
            OxmField::Ipv4Src(ref m) => basic(OxmCode::Ipv4Src, m.mask.is_some()),
            OxmField::Ipv4Dst(ref m) => basic(OxmCode::Ipv4Dst, m.mask.is_some()),
            OxmField::TcpSrc(_) => basic(OxmCode::TcpSrc, false),
            OxmField::TcpDst(_) => basic(OxmCode::TcpDst, false),
            OxmField::UdpSrc(_) => basic(OxmCode::UdpSrc, false),
            OxmField::UdpDst(_) => basic(OxmCode::UdpDst, false),
            OxmField::Icmpv4Type(_) => basic(OxmCode::Icmpv4Type, false),
            OxmField::Icmpv4Code(_) => basic(OxmCode::Icmpv4Code, false),
            OxmField::ArpOp(_) => basic(OxmCode::ArpOp, false),
            OxmField::ArpSpa(ref m) => basic(OxmCode::ArpSpa, m.mask.is_some()),
            OxmField::ArpTpa(ref m) => basic(OxmCode::ArpTpa, m.mask.is_some()),
            OxmField::TunnelId(ref m) => basic(OxmCode::TunnelId, m.mask.is_some()),
            OxmField::Unknown { class, field, hasmask, .. } => (class, field, hasmask),
        }
    }

    fn value_len(&self) -> usize {
        match *self {
            OxmField::VlanPcp(_) |
            OxmField::IpDscp(_) |
            OxmField::IpEcn(_) |
            OxmField::IpProto(_) |
            OxmField::Icmpv4Type(_) |
            OxmField::Icmpv4Code(_) => 1,
            OxmField::EthType(_) |
            OxmField::TcpSrc(_) |
            OxmField::TcpDst(_) |
            OxmField::UdpSrc(_) |
            OxmField::UdpDst(_) |
            OxmField::ArpOp(_) => 2,
            OxmField::InPort(_) |
            OxmField::InPhyPort(_) => 4,
            OxmField::Metadata(ref m) |
            OxmField::TunnelId(ref m) => m.width(),
            OxmField::EthDst(ref m) |
            OxmField::EthSrc(ref m) => m.width(),
            OxmField::VlanVid(ref m) => m.width(),
            OxmField::Ipv4Src(ref m) |
            OxmField::Ipv4Dst(ref m) |
            OxmField::ArpSpa(ref m) |
            OxmField::ArpTpa(ref m) => m.width(),
            OxmField::Unknown { ref value, .. } => value.len(),
        }
    }

    /// TLV size: 4-byte OXM header plus value (and mask).
    pub fn size_of(&self) -> usize {
        4 + self.value_len()
    }

    pub fn parse(bytes: &mut Reader) -> Result<OxmField, OfpSerializationError> {
        let class = bytes.read_u16::<BigEndian>()?;
        let field_and_mask = bytes.read_u8()?;
        let len = bytes.read_u8()? as usize;
        let field = field_and_mask >> 1;
        let hasmask = field_and_mask & 1 == 1;
        let value = take(bytes, len)?;
        Ok(Self::decode(class, field, hasmask, value).unwrap_or_else(|| {
            OxmField::Unknown {
                class,
                field,
                hasmask,
                value: value.to_vec(),
            }
        }))
    }

    fn decode(class: u16, field: u8, hasmask: bool, value: &[u8]) -> Option<OxmField> {
        if class != OFPXMC_OPENFLOW_BASIC {
            return None;
        }
        match field {
            f if f == OxmCode::InPort as u8 => exact(hasmask, value).map(OxmField::InPort),
            f if f == OxmCode::InPhyPort as u8 => exact(hasmask, value).map(OxmField::InPhyPort),
            f if f == OxmCode::Metadata as u8 => masked(hasmask, value).map(OxmField::Metadata),
            f if f == OxmCode::EthDst as u8 => masked(hasmask, value).map(OxmField::EthDst),
            f if f == OxmCode::EthSrc as u8 => masked(hasmask, value).map(OxmField::EthSrc),
            f if f == OxmCode::EthType as u8 => exact(hasmask, value).map(OxmField::EthType),
            f if f == OxmCode::VlanVid as u8 => masked(hasmask, value).map(OxmField::VlanVid),
            f if f == OxmCode::VlanPcp as u8 => exact(hasmask, value).map(OxmField::VlanPcp),
            f if f == OxmCode::IpDscp as u8 => exact(hasmask, value).map(OxmField::IpDscp),
            f if f == OxmCode::IpEcn as u8 => exact(hasmask, value).map(OxmField::IpEcn),
            f if f == OxmCode::IpProto as u8 => exact(hasmask, value).map(OxmField::IpProto),
            f if f == OxmCode::Ipv4Src as u8 => masked(hasmask, value).map(OxmField::Ipv4Src),
            f if f == OxmCode::Ipv4Dst as u8 => masked(hasmask, value).map(OxmField::Ipv4Dst),
            f if f == OxmCode::TcpSrc as u8 => exact(hasmask, value).map(OxmField::TcpSrc),
            f if f == OxmCode::TcpDst as u8 => exact(hasmask, value).map(OxmField::TcpDst),
            f if f == OxmCode::UdpSrc as u8 => exact(hasmask, value).map(OxmField::UdpSrc),
            f if f == OxmCode::UdpDst as u8 => exact(hasmask, value).map(OxmField::UdpDst),
            f if f == OxmCode::Icmpv4Type as u8 => exact(hasmask, value).map(OxmField::Icmpv4Type),
            f if f == OxmCode::Icmpv4Code as u8 => exact(hasmask, value).map(OxmField::Icmpv4Code),
            f if f == OxmCode::ArpOp as u8 => exact(hasmask, value).map(OxmField::ArpOp),
            f if f == OxmCode::ArpSpa as u8 => masked(hasmask, value).map(OxmField::ArpSpa),
            f if f == OxmCode::ArpTpa as u8 => masked(hasmask, value).map(OxmField::ArpTpa),
            f if f == OxmCode::TunnelId as u8 => masked(hasmask, value).map(OxmField::TunnelId),
            _ => None,
        }
    }

    pub fn marshal(&self, bytes: &mut Vec<u8>) {
        let (class, field, hasmask) = self.code();
        bytes.put_u16(class);
        bytes.put_u8(field << 1 | hasmask as u8);
        bytes.put_u8(self.value_len() as u8);
        match *self {
            OxmField::InPort(v) |
            OxmField::InPhyPort(v) => v.put(bytes),
            OxmField::EthType(v) |
            OxmField::TcpSrc(v) |
            OxmField::TcpDst(v) |
            OxmField::UdpSrc(v) |
            OxmField::UdpDst(v) |
            OxmField::ArpOp(v) => v.put(bytes),
            OxmField::VlanPcp(v) |
            OxmField::IpDscp(v) |
            OxmField::IpEcn(v) |
            OxmField::IpProto(v) |
            OxmField::Icmpv4Type(v) |
            OxmField::Icmpv4Code(v) => v.put(bytes),
            OxmField::Metadata(ref m) |
            OxmField::TunnelId(ref m) => m.put(bytes),
            OxmField::EthDst(ref m) |
            OxmField::EthSrc(ref m) => m.put(bytes),
            OxmField::VlanVid(ref m) => m.put(bytes),
            OxmField::Ipv4Src(ref m) |
            OxmField::Ipv4Dst(ref m) |
            OxmField::ArpSpa(ref m) |
            OxmField::ArpTpa(ref m) => m.put(bytes),
            OxmField::Unknown { ref value, .. } => bytes.put_slice(value),
        }
    }
}

/// Fields to match against flows, as an ordered list of OXM TLVs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pattern {
    pub fields: Vec<OxmField>,
}

impl Pattern {
    /// A pattern with no fields, matching every packet.
    pub fn match_all() -> Pattern {
        Pattern::default()
    }

    pub fn with(mut self, field: OxmField) -> Pattern {
        self.fields.push(field);
        self
    }

    /// The `in_port` the pattern carries, if any. Packet-in messages report the ingress
    /// port this way.
    pub fn in_port(&self) -> Option<u32> {
        self.fields.iter().find_map(|f| match *f {
            OxmField::InPort(p) => Some(p),
            _ => None,
        })
    }

    /// Value of the `length` field: match header plus OXM TLVs, padding excluded.
    fn match_len(&self) -> usize {
        4 + self.fields.iter().map(OxmField::size_of).sum::<usize>()
    }

    pub fn size_of(&self) -> usize {
        let len = self.match_len();
        len + pad8(len)
    }

    pub fn parse(bytes: &mut Reader) -> Result<Pattern, OfpSerializationError> {
        let typ = bytes.read_u16::<BigEndian>()?;
        if typ != OFPMT_OXM {
            return Err(OfpSerializationError::UnexpectedValue {
                field: "match type",
                value: typ as u64,
            });
        }
        let length = bytes.read_u16::<BigEndian>()? as usize;
        check_len("match", length, 4, remaining(bytes) + 4)?;
        let mut oxms = Cursor::new(take(bytes, length - 4)?);
        let mut fields = vec![];
        while remaining(&oxms) > 0 {
            fields.push(OxmField::parse(&mut oxms)?);
        }
        skip(bytes, pad8(length))?;
        Ok(Pattern { fields })
    }

    pub fn marshal(&self, bytes: &mut Vec<u8>) {
        let len = self.match_len();
        bytes.put_u16(OFPMT_OXM);
        bytes.put_u16(len as u16);
        for field in &self.fields {
            field.marshal(bytes);
        }
        bytes.put_bytes(0, pad8(len));
    }
}
