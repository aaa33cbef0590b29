use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::ofp_message::OfpSerializationError;
use super::action::Action;
use super::oxm::Pattern;
use super::{check_len, remaining, rest, skip, take, MessageType, Payload, PseudoPort};

/// The reason a packet arrives at the controller.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PacketInReason {
    NoMatch = 0,
    Action = 1,
    InvalidTtl = 2,
}

impl PacketInReason {
    fn of_int(r: u8) -> Result<PacketInReason, OfpSerializationError> {
        match r {
            0 => Ok(PacketInReason::NoMatch),
            1 => Ok(PacketInReason::Action),
            2 => Ok(PacketInReason::InvalidTtl),
            r => {
                Err(OfpSerializationError::UnexpectedValue {
                    field: "packet in reason",
                    value: r as u64,
                })
            }
        }
    }
}

/// Represents packets received by the datapath and sent to the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketIn {
    pub input_payload: Payload,
    pub total_len: u16,
    pub reason: PacketInReason,
    pub table_id: u8,
    pub cookie: u64,
    /// Pipeline fields; `in_port` is always present.
    pub pattern: Pattern,
}

impl PacketIn {
    /// Ingress port reported in the packet's match.
    pub fn in_port(&self) -> Option<u32> {
        self.pattern.in_port()
    }
}

impl MessageType for PacketIn {
    fn size_of(&self) -> usize {
        16 + self.pattern.size_of() + 2 + self.input_payload.size_of()
    }

    fn parse(buf: &[u8]) -> Result<PacketIn, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let buffer_id = bytes.read_u32::<BigEndian>()?;
        let total_len = bytes.read_u16::<BigEndian>()?;
        let reason = PacketInReason::of_int(bytes.read_u8()?)?;
        let table_id = bytes.read_u8()?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let pattern = Pattern::parse(&mut bytes)?;
        skip(&mut bytes, 2)?;
        let data = rest(&mut bytes).to_vec();
        Ok(PacketIn {
            input_payload: Payload::from_parts(buffer_id, data),
            total_len,
            reason,
            table_id,
            cookie,
            pattern,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.input_payload.buffer_id());
        bytes.put_u16(self.total_len);
        bytes.put_u8(self.reason as u8);
        bytes.put_u8(self.table_id);
        bytes.put_u64(self.cookie);
        self.pattern.marshal(bytes);
        bytes.put_bytes(0, 2);
        bytes.put_slice(self.input_payload.bytes());
    }
}

/// Send a packet out of the datapath.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketOut {
    /// With a buffered payload the switch already holds the packet; data may be empty.
    pub output_payload: Payload,
    pub in_port: PseudoPort,
    pub apply_actions: Vec<Action>,
}

impl MessageType for PacketOut {
    fn size_of(&self) -> usize {
        16 + Action::size_of_sequence(&self.apply_actions) + self.output_payload.size_of()
    }

    fn parse(buf: &[u8]) -> Result<PacketOut, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let buffer_id = bytes.read_u32::<BigEndian>()?;
        let in_port = PseudoPort::of_int(bytes.read_u32::<BigEndian>()?)?;
        let actions_len = bytes.read_u16::<BigEndian>()? as usize;
        skip(&mut bytes, 6)?;
        check_len("packet out actions", actions_len, 0, remaining(&bytes))?;
        let apply_actions = Action::parse_sequence(&mut Cursor::new(take(&mut bytes, actions_len)?))?;
        let data = rest(&mut bytes).to_vec();
        Ok(PacketOut {
            output_payload: Payload::from_parts(buffer_id, data),
            in_port,
            apply_actions,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.output_payload.buffer_id());
        self.in_port.marshal(bytes);
        bytes.put_u16(Action::size_of_sequence(&self.apply_actions) as u16);
        bytes.put_bytes(0, 6);
        Action::marshal_sequence(&self.apply_actions, bytes);
        bytes.put_slice(self.output_payload.bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x04::oxm::OxmField;

    #[test]
    fn packet_in_from_the_wire() {
        let wire = [
            0xff, 0xff, 0xff, 0xff, // no buffer
            0x00, 0x04, 0x00, 0x00, // total len 4, no match, table 0
            0, 0, 0, 0, 0, 0, 0, 0, // cookie
            0x00, 0x01, 0x00, 0x0c, 0x80, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x02, 0, 0, 0, 0,
            0, 0, // pad
            0xde, 0xad, 0xbe, 0xef,
        ];
        let pi = PacketIn::parse(&wire).unwrap();
        assert_eq!(pi.in_port(), Some(2));
        assert_eq!(pi.reason, PacketInReason::NoMatch);
        assert_eq!(pi.input_payload, Payload::NotBuffered(vec![0xde, 0xad, 0xbe, 0xef]));
        let mut bytes = vec![];
        pi.marshal(&mut bytes);
        assert_eq!(bytes, wire);
        assert_eq!(pi.size_of(), wire.len());
    }

    #[test]
    fn packet_out_round_trip() {
        let po = PacketOut {
            output_payload: Payload::Buffered(12, vec![]),
            in_port: PseudoPort::Controller,
            apply_actions: vec![Action::output(PseudoPort::Flood),
                                Action::SetField(OxmField::IpDscp(4))],
        };
        let mut bytes = vec![];
        po.marshal(&mut bytes);
        assert_eq!(bytes.len(), po.size_of());
        assert_eq!(PacketOut::parse(&bytes).unwrap(), po);
    }

    #[test]
    fn packet_out_actions_len_is_checked() {
        let mut bytes = vec![];
        PacketOut {
                output_payload: Payload::NotBuffered(vec![]),
                in_port: PseudoPort::Controller,
                apply_actions: vec![],
            }
            .marshal(&mut bytes);
        bytes[8] = 0x01;
        assert!(PacketOut::parse(&bytes).is_err());
    }
}
