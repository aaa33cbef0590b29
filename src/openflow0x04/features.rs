use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::bits::{bit, test_bit};
use crate::ofp_message::OfpSerializationError;
use super::oxm::MacAddr;
use super::{put_string, read_array, read_string, skip, MessageType, Reader};

/// Capabilities supported by the datapath.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub flow_stats: bool,
    pub table_stats: bool,
    pub port_stats: bool,
    pub group_stats: bool,
    pub ip_reasm: bool,
    pub queue_stats: bool,
    pub port_blocked: bool,
}

impl Capabilities {
    fn of_int(d: u32) -> Capabilities {
        Capabilities {
            flow_stats: test_bit(0, d as u64),
            table_stats: test_bit(1, d as u64),
            port_stats: test_bit(2, d as u64),
            group_stats: test_bit(3, d as u64),
            ip_reasm: test_bit(5, d as u64),
            queue_stats: test_bit(6, d as u64),
            port_blocked: test_bit(8, d as u64),
        }
    }

    fn to_int(self) -> u32 {
        let mut d = 0;
        d = bit(0, d, self.flow_stats);
        d = bit(1, d, self.table_stats);
        d = bit(2, d, self.port_stats);
        d = bit(3, d, self.group_stats);
        d = bit(5, d, self.ip_reasm);
        d = bit(6, d, self.queue_stats);
        d = bit(8, d, self.port_blocked);
        d as u32
    }
}

/// Switch features, the reply to a features request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub num_buffers: u32,
    pub num_tables: u8,
    pub auxiliary_id: u8,
    pub supported_capabilities: Capabilities,
    pub reserved: u32,
}

impl MessageType for SwitchFeatures {
    fn size_of(&self) -> usize {
        24
    }

    fn parse(buf: &[u8]) -> Result<SwitchFeatures, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let datapath_id = bytes.read_u64::<BigEndian>()?;
        let num_buffers = bytes.read_u32::<BigEndian>()?;
        let num_tables = bytes.read_u8()?;
        let auxiliary_id = bytes.read_u8()?;
        skip(&mut bytes, 2)?;
        let supported_capabilities = Capabilities::of_int(bytes.read_u32::<BigEndian>()?);
        let reserved = bytes.read_u32::<BigEndian>()?;
        Ok(SwitchFeatures {
            datapath_id,
            num_buffers,
            num_tables,
            auxiliary_id,
            supported_capabilities,
            reserved,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u64(self.datapath_id);
        bytes.put_u32(self.num_buffers);
        bytes.put_u8(self.num_tables);
        bytes.put_u8(self.auxiliary_id);
        bytes.put_bytes(0, 2);
        bytes.put_u32(self.supported_capabilities.to_int());
        bytes.put_u32(self.reserved);
    }
}

/// Flags to indicate behavior of the physical port.
///
/// These flags are used both to describe the current configuration of a physical port,
/// and to configure a port's behavior.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PortConfig {
    pub port_down: bool,
    pub no_recv: bool,
    pub no_fwd: bool,
    pub no_packet_in: bool,
}

impl PortConfig {
    fn of_int(d: u32) -> PortConfig {
        PortConfig {
            port_down: test_bit(0, d as u64),
            no_recv: test_bit(2, d as u64),
            no_fwd: test_bit(5, d as u64),
            no_packet_in: test_bit(6, d as u64),
        }
    }

    fn to_int(self) -> u32 {
        let mut d = 0;
        d = bit(0, d, self.port_down);
        d = bit(2, d, self.no_recv);
        d = bit(5, d, self.no_fwd);
        d = bit(6, d, self.no_packet_in);
        d as u32
    }
}

/// Current state of a physical port. Not configurable by the controller.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PortState {
    pub link_down: bool,
    pub blocked: bool,
    pub live: bool,
}

impl PortState {
    fn of_int(d: u32) -> PortState {
        PortState {
            link_down: test_bit(0, d as u64),
            blocked: test_bit(1, d as u64),
            live: test_bit(2, d as u64),
        }
    }

    fn to_int(self) -> u32 {
        let mut d = 0;
        d = bit(0, d, self.link_down);
        d = bit(1, d, self.blocked);
        d = bit(2, d, self.live);
        d as u32
    }
}

/// Features of physical ports available in a datapath.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PortFeatures {
    pub f_10mbhd: bool,
    pub f_10mbfd: bool,
    pub f_100mbhd: bool,
    pub f_100mbfd: bool,
    pub f_1gbhd: bool,
    pub f_1gbfd: bool,
    pub f_10gbfd: bool,
    pub f_40gbfd: bool,
    pub f_100gbfd: bool,
    pub f_1tbfd: bool,
    pub other: bool,
    pub copper: bool,
    pub fiber: bool,
    pub autoneg: bool,
    pub pause: bool,
    pub pause_asym: bool,
}

impl PortFeatures {
    fn flags(self) -> [bool; 16] {
        [self.f_10mbhd, self.f_10mbfd, self.f_100mbhd, self.f_100mbfd, self.f_1gbhd,
         self.f_1gbfd, self.f_10gbfd, self.f_40gbfd, self.f_100gbfd, self.f_1tbfd, self.other,
         self.copper, self.fiber, self.autoneg, self.pause, self.pause_asym]
    }

    fn of_int(d: u32) -> PortFeatures {
        let t = |b: u64| test_bit(b, d as u64);
        PortFeatures {
            f_10mbhd: t(0),
            f_10mbfd: t(1),
            f_100mbhd: t(2),
            f_100mbfd: t(3),
            f_1gbhd: t(4),
            f_1gbfd: t(5),
            f_10gbfd: t(6),
            f_40gbfd: t(7),
            f_100gbfd: t(8),
            f_1tbfd: t(9),
            other: t(10),
            copper: t(11),
            fiber: t(12),
            autoneg: t(13),
            pause: t(14),
            pause_asym: t(15),
        }
    }

    fn to_int(self) -> u32 {
        self.flags()
            .iter()
            .enumerate()
            .fold(0, |d, (i, on)| bit(i as u64, d, *on)) as u32
    }
}

/// Description of a port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortDesc {
    pub port_no: u32,
    pub hw_addr: MacAddr,
    pub name: String,
    pub config: PortConfig,
    pub state: PortState,
    pub curr: PortFeatures,
    pub advertised: PortFeatures,
    pub supported: PortFeatures,
    pub peer: PortFeatures,
    pub curr_speed: u32,
    pub max_speed: u32,
}

impl PortDesc {
    pub fn size_of(&self) -> usize {
        64
    }

    pub fn parse(bytes: &mut Reader) -> Result<PortDesc, OfpSerializationError> {
        let port_no = bytes.read_u32::<BigEndian>()?;
        skip(bytes, 4)?;
        let hw_addr = read_array::<6>(bytes)?;
        skip(bytes, 2)?;
        let name = read_string::<16>(bytes)?;
        let config = PortConfig::of_int(bytes.read_u32::<BigEndian>()?);
        let state = PortState::of_int(bytes.read_u32::<BigEndian>()?);
        let curr = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let advertised = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let supported = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let peer = PortFeatures::of_int(bytes.read_u32::<BigEndian>()?);
        let curr_speed = bytes.read_u32::<BigEndian>()?;
        let max_speed = bytes.read_u32::<BigEndian>()?;
        Ok(PortDesc {
            port_no,
            hw_addr,
            name,
            config,
            state,
            curr,
            advertised,
            supported,
            peer,
            curr_speed,
            max_speed,
        })
    }

    pub fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.port_no);
        bytes.put_bytes(0, 4);
        bytes.put_slice(&self.hw_addr);
        bytes.put_bytes(0, 2);
        put_string(bytes, &self.name, 16);
        bytes.put_u32(self.config.to_int());
        bytes.put_u32(self.state.to_int());
        bytes.put_u32(self.curr.to_int());
        bytes.put_u32(self.advertised.to_int());
        bytes.put_u32(self.supported.to_int());
        bytes.put_u32(self.peer.to_int());
        bytes.put_u32(self.curr_speed);
        bytes.put_u32(self.max_speed);
    }
}

/// What changed about a physical port.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PortReason {
    PortAdd = 0,
    PortDelete = 1,
    PortModify = 2,
}

impl PortReason {
    fn of_int(r: u8) -> Result<PortReason, OfpSerializationError> {
        match r {
            0 => Ok(PortReason::PortAdd),
            1 => Ok(PortReason::PortDelete),
            2 => Ok(PortReason::PortModify),
            r => {
                Err(OfpSerializationError::UnexpectedValue {
                    field: "port status reason",
                    value: r as u64,
                })
            }
        }
    }
}

/// A physical port has changed in the datapath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortStatus {
    pub reason: PortReason,
    pub desc: PortDesc,
}

impl MessageType for PortStatus {
    fn size_of(&self) -> usize {
        8 + self.desc.size_of()
    }

    fn parse(buf: &[u8]) -> Result<PortStatus, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let reason = PortReason::of_int(bytes.read_u8()?)?;
        skip(&mut bytes, 7)?;
        let desc = PortDesc::parse(&mut bytes)?;
        Ok(PortStatus { reason, desc })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u8(self.reason as u8);
        bytes.put_bytes(0, 7);
        self.desc.marshal(bytes);
    }
}
