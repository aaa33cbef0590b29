use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::bits::{bit, test_bit};
use crate::ofp_message::OfpSerializationError;
use super::action::Instruction;
use super::oxm::Pattern;
use super::{skip, MessageType, PseudoPort, Timeout, OFPG_ANY};

const OFP_NO_BUFFER: u32 = 0xffffffff;

/// Type of modification to perform on a flow table.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowModCmd {
    AddFlow = 0,
    ModFlow = 1,
    ModStrictFlow = 2,
    DeleteFlow = 3,
    DeleteStrictFlow = 4,
}

impl FlowModCmd {
    fn of_int(cmd: u8) -> Result<FlowModCmd, OfpSerializationError> {
        match cmd {
            0 => Ok(FlowModCmd::AddFlow),
            1 => Ok(FlowModCmd::ModFlow),
            2 => Ok(FlowModCmd::ModStrictFlow),
            3 => Ok(FlowModCmd::DeleteFlow),
            4 => Ok(FlowModCmd::DeleteStrictFlow),
            c => {
                Err(OfpSerializationError::UnexpectedValue {
                    field: "flow mod command",
                    value: c as u64,
                })
            }
        }
    }
}

/// Flow entry flags shared by flow-mod and flow-stats.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowModFlags {
    pub send_flow_rem: bool,
    pub check_overlap: bool,
    pub reset_counts: bool,
    pub no_pkt_counts: bool,
    pub no_byt_counts: bool,
}

impl FlowModFlags {
    pub(crate) fn of_int(flags: u16) -> FlowModFlags {
        FlowModFlags {
            send_flow_rem: test_bit(0, flags as u64),
            check_overlap: test_bit(1, flags as u64),
            reset_counts: test_bit(2, flags as u64),
            no_pkt_counts: test_bit(3, flags as u64),
            no_byt_counts: test_bit(4, flags as u64),
        }
    }

    pub(crate) fn to_int(self) -> u16 {
        let mut d = 0;
        d = bit(0, d, self.send_flow_rem);
        d = bit(1, d, self.check_overlap);
        d = bit(2, d, self.reset_counts);
        d = bit(3, d, self.no_pkt_counts);
        d = bit(4, d, self.no_byt_counts);
        d as u16
    }
}

/// Represents modifications to a flow table from the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowMod {
    pub cookie: u64,
    pub cookie_mask: u64,
    pub table_id: u8,
    pub command: FlowModCmd,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub priority: u16,
    /// Buffered packet to run through the new entry once it is installed.
    pub apply_to_packet: Option<u32>,
    pub out_port: PseudoPort,
    pub out_group: u32,
    pub flags: FlowModFlags,
    pub pattern: Pattern,
    pub instructions: Vec<Instruction>,
}

impl FlowMod {
    /// Return a `FlowMod` adding a permanent flow to table 0 parameterized by the given
    /// `priority`, `pattern`, and `instructions`.
    pub fn add_flow(priority: u16, pattern: Pattern, instructions: Vec<Instruction>) -> FlowMod {
        FlowMod {
            cookie: 0,
            cookie_mask: 0,
            table_id: 0,
            command: FlowModCmd::AddFlow,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::Permanent,
            priority,
            apply_to_packet: None,
            out_port: PseudoPort::Any,
            out_group: OFPG_ANY,
            flags: FlowModFlags::default(),
            pattern,
            instructions,
        }
    }
}

impl MessageType for FlowMod {
    fn size_of(&self) -> usize {
        40 + self.pattern.size_of() + Instruction::size_of_sequence(&self.instructions)
    }

    fn parse(buf: &[u8]) -> Result<FlowMod, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let cookie = bytes.read_u64::<BigEndian>()?;
        let cookie_mask = bytes.read_u64::<BigEndian>()?;
        let table_id = bytes.read_u8()?;
        let command = FlowModCmd::of_int(bytes.read_u8()?)?;
        let idle = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let priority = bytes.read_u16::<BigEndian>()?;
        let buffer_id = bytes.read_u32::<BigEndian>()?;
        let out_port = PseudoPort::of_int(bytes.read_u32::<BigEndian>()?)?;
        let out_group = bytes.read_u32::<BigEndian>()?;
        let flags = FlowModFlags::of_int(bytes.read_u16::<BigEndian>()?);
        skip(&mut bytes, 2)?;
        let pattern = Pattern::parse(&mut bytes)?;
        let instructions = Instruction::parse_sequence(&mut bytes)?;
        Ok(FlowMod {
            cookie,
            cookie_mask,
            table_id,
            command,
            idle_timeout: idle,
            hard_timeout: hard,
            priority,
            apply_to_packet: match buffer_id {
                OFP_NO_BUFFER => None,
                n => Some(n),
            },
            out_port,
            out_group,
            flags,
            pattern,
            instructions,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u64(self.cookie);
        bytes.put_u64(self.cookie_mask);
        bytes.put_u8(self.table_id);
        bytes.put_u8(self.command as u8);
        bytes.put_u16(self.idle_timeout.to_int());
        bytes.put_u16(self.hard_timeout.to_int());
        bytes.put_u16(self.priority);
        bytes.put_u32(self.apply_to_packet.unwrap_or(OFP_NO_BUFFER));
        self.out_port.marshal(bytes);
        bytes.put_u32(self.out_group);
        bytes.put_u16(self.flags.to_int());
        bytes.put_bytes(0, 2);
        self.pattern.marshal(bytes);
        Instruction::marshal_sequence(&self.instructions, bytes);
    }
}

/// Why a flow entry left the table.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FlowRemovedReason {
    IdleTimeout = 0,
    HardTimeout = 1,
    Delete = 2,
    GroupDelete = 3,
}

impl FlowRemovedReason {
    fn of_int(r: u8) -> Result<FlowRemovedReason, OfpSerializationError> {
        match r {
            0 => Ok(FlowRemovedReason::IdleTimeout),
            1 => Ok(FlowRemovedReason::HardTimeout),
            2 => Ok(FlowRemovedReason::Delete),
            3 => Ok(FlowRemovedReason::GroupDelete),
            r => {
                Err(OfpSerializationError::UnexpectedValue {
                    field: "flow removed reason",
                    value: r as u64,
                })
            }
        }
    }
}

/// Flow removed (datapath -> controller), sent for entries installed with `send_flow_rem`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowRemoved {
    pub cookie: u64,
    pub priority: u16,
    pub reason: FlowRemovedReason,
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub packet_count: u64,
    pub byte_count: u64,
    pub pattern: Pattern,
}

impl MessageType for FlowRemoved {
    fn size_of(&self) -> usize {
        40 + self.pattern.size_of()
    }

    fn parse(buf: &[u8]) -> Result<FlowRemoved, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let cookie = bytes.read_u64::<BigEndian>()?;
        let priority = bytes.read_u16::<BigEndian>()?;
        let reason = FlowRemovedReason::of_int(bytes.read_u8()?)?;
        let table_id = bytes.read_u8()?;
        let duration_sec = bytes.read_u32::<BigEndian>()?;
        let duration_nsec = bytes.read_u32::<BigEndian>()?;
        let idle_timeout = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let hard_timeout = Timeout::of_int(bytes.read_u16::<BigEndian>()?);
        let packet_count = bytes.read_u64::<BigEndian>()?;
        let byte_count = bytes.read_u64::<BigEndian>()?;
        let pattern = Pattern::parse(&mut bytes)?;
        Ok(FlowRemoved {
            cookie,
            priority,
            reason,
            table_id,
            duration_sec,
            duration_nsec,
            idle_timeout,
            hard_timeout,
            packet_count,
            byte_count,
            pattern,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u64(self.cookie);
        bytes.put_u16(self.priority);
        bytes.put_u8(self.reason as u8);
        bytes.put_u8(self.table_id);
        bytes.put_u32(self.duration_sec);
        bytes.put_u32(self.duration_nsec);
        bytes.put_u16(self.idle_timeout.to_int());
        bytes.put_u16(self.hard_timeout.to_int());
        bytes.put_u64(self.packet_count);
        bytes.put_u64(self.byte_count);
        self.pattern.marshal(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x04::action::Action;
    use crate::openflow0x04::oxm::{Mask, OxmField};

    #[test]
    fn table_miss_flow_mod_wire_layout() {
        let fm = FlowMod::add_flow(0,
                                   Pattern::match_all(),
                                   vec![Instruction::ApplyActions(vec![Action::to_controller()])]);
        let mut bytes = vec![];
        fm.marshal(&mut bytes);
        assert_eq!(bytes.len(), fm.size_of());
        assert_eq!(bytes.len(), 40 + 8 + 24);
        // buffer id, out port, out group
        assert_eq!(&bytes[24..36],
                   &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(FlowMod::parse(&bytes).unwrap(), fm);
    }

    #[test]
    fn flow_mod_with_flags_and_timeouts() {
        let mut fm = FlowMod::add_flow(10,
                                       Pattern::match_all()
                                           .with(OxmField::InPort(1))
                                           .with(OxmField::EthDst(Mask::exact([1, 2, 3, 4, 5, 6]))),
                                       vec![Instruction::GotoTable(1)]);
        fm.idle_timeout = Timeout::ExpiresAfter(30);
        fm.flags.send_flow_rem = true;
        fm.flags.check_overlap = true;
        fm.apply_to_packet = Some(77);
        let mut bytes = vec![];
        fm.marshal(&mut bytes);
        let parsed = FlowMod::parse(&bytes).unwrap();
        assert_eq!(parsed, fm);
        assert_eq!(parsed.flags.to_int(), 0b11);
    }

    #[test]
    fn flow_removed_round_trip() {
        let fr = FlowRemoved {
            cookie: 0xdead,
            priority: 5,
            reason: FlowRemovedReason::IdleTimeout,
            table_id: 0,
            duration_sec: 61,
            duration_nsec: 5,
            idle_timeout: Timeout::ExpiresAfter(60),
            hard_timeout: Timeout::Permanent,
            packet_count: 12,
            byte_count: 1200,
            pattern: Pattern::match_all().with(OxmField::EthType(0x0800)),
        };
        let mut bytes = vec![];
        fr.marshal(&mut bytes);
        assert_eq!(bytes.len(), fr.size_of());
        assert_eq!(FlowRemoved::parse(&bytes).unwrap(), fr);
    }

    #[test]
    fn unknown_command_is_rejected() {
        let mut bytes = vec![];
        FlowMod::add_flow(1, Pattern::match_all(), vec![]).marshal(&mut bytes);
        bytes[17] = 9;
        assert!(matches!(FlowMod::parse(&bytes),
                         Err(OfpSerializationError::UnexpectedValue { field: "flow mod command", .. })));
    }
}
