use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::bits::{pad8, round8};
use crate::ofp_message::OfpSerializationError;
use super::oxm::OxmField;
use super::{check_len, remaining, skip, take, PseudoPort, Reader};

#[repr(u16)]
enum OfpActionType {
    OFPATOutput = 0,
    OFPATCopyTtlOut = 11,
    OFPATCopyTtlIn = 12,
    OFPATSetMplsTtl = 15,
    OFPATDecMplsTtl = 16,
    OFPATPushVlan = 17,
    OFPATPopVlan = 18,
    OFPATPushMpls = 19,
    OFPATPopMpls = 20,
    OFPATSetQueue = 21,
    OFPATGroup = 22,
    OFPATSetNwTtl = 23,
    OFPATDecNwTtl = 24,
    OFPATSetField = 25,
    OFPATPushPbb = 26,
    OFPATPopPbb = 27,
}

/// Actions associated with flows, buckets and packets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send out `port`; `max_len` bytes go to the controller when `port` is `Controller`.
    Output { port: PseudoPort, max_len: u16 },
    CopyTtlOut,
    CopyTtlIn,
    SetMplsTtl(u8),
    DecMplsTtl,
    PushVlan(u16),
    PopVlan,
    PushMpls(u16),
    PopMpls(u16),
    SetQueue(u32),
    Group(u32),
    SetNwTtl(u8),
    DecNwTtl,
    SetField(OxmField),
    PushPbb(u16),
    PopPbb,
    /// Experimenter or otherwise undecoded action, body kept verbatim.
    Unknown { typ: u16, body: Vec<u8> },
}

impl Action {
    /// Shorthand for an output action that sends whole packets to the controller.
    pub fn to_controller() -> Action {
        Action::Output {
            port: PseudoPort::Controller,
            max_len: super::OFPCML_NO_BUFFER,
        }
    }

    /// Shorthand for an output action on a port.
    pub fn output(port: PseudoPort) -> Action {
        Action::Output { port, max_len: 0 }
    }

    fn type_code(&self) -> u16 {
        let code = match *self {
            Action::Output { .. } => OfpActionType::OFPATOutput,
            Action::CopyTtlOut => OfpActionType::OFPATCopyTtlOut,
            Action::CopyTtlIn => OfpActionType::OFPATCopyTtlIn,
            Action::SetMplsTtl(_) => OfpActionType::OFPATSetMplsTtl,
            Action::DecMplsTtl => OfpActionType::OFPATDecMplsTtl,
            Action::PushVlan(_) => OfpActionType::OFPATPushVlan,
            Action::PopVlan => OfpActionType::OFPATPopVlan,
            Action::PushMpls(_) => OfpActionType::OFPATPushMpls,
            Action::PopMpls(_) => OfpActionType::OFPATPopMpls,
            Action::SetQueue(_) => OfpActionType::OFPATSetQueue,
            Action::Group(_) => OfpActionType::OFPATGroup,
            Action::SetNwTtl(_) => OfpActionType::OFPATSetNwTtl,
            Action::DecNwTtl => OfpActionType::OFPATDecNwTtl,
            Action::SetField(_) => OfpActionType::OFPATSetField,
            Action::PushPbb(_) => OfpActionType::OFPATPushPbb,
            Action::PopPbb => OfpActionType::OFPATPopPbb,
            Action::Unknown { typ, .. } => return typ,
        };
        code as u16
    }

    pub fn size_of(&self) -> usize {
        match *self {
            Action::Output { .. } => 16,
            Action::SetField(ref oxm) => round8(4 + oxm.size_of()),
            Action::Unknown { ref body, .. } => 4 + body.len(),
            _ => 8,
        }
    }

    pub fn size_of_sequence(actions: &[Action]) -> usize {
        actions.iter().fold(0, |acc, x| x.size_of() + acc)
    }

    pub fn parse(bytes: &mut Reader) -> Result<Action, OfpSerializationError> {
        let typ = bytes.read_u16::<BigEndian>()?;
        let len = bytes.read_u16::<BigEndian>()? as usize;
        check_len("action", len, 4, remaining(bytes) + 4)?;
        let mut body = Cursor::new(take(bytes, len - 4)?);
        let action = match typ {
            t if t == OfpActionType::OFPATOutput as u16 => {
                let port = PseudoPort::of_int(body.read_u32::<BigEndian>()?)?;
                let max_len = body.read_u16::<BigEndian>()?;
                Action::Output { port, max_len }
            }
            t if t == OfpActionType::OFPATCopyTtlOut as u16 => Action::CopyTtlOut,
            t if t == OfpActionType::OFPATCopyTtlIn as u16 => Action::CopyTtlIn,
            t if t == OfpActionType::OFPATSetMplsTtl as u16 => Action::SetMplsTtl(body.read_u8()?),
            t if t == OfpActionType::OFPATDecMplsTtl as u16 => Action::DecMplsTtl,
            t if t == OfpActionType::OFPATPushVlan as u16 => {
                Action::PushVlan(body.read_u16::<BigEndian>()?)
            }
            t if t == OfpActionType::OFPATPopVlan as u16 => Action::PopVlan,
            t if t == OfpActionType::OFPATPushMpls as u16 => {
                Action::PushMpls(body.read_u16::<BigEndian>()?)
            }
            t if t == OfpActionType::OFPATPopMpls as u16 => {
                Action::PopMpls(body.read_u16::<BigEndian>()?)
            }
            t if t == OfpActionType::OFPATSetQueue as u16 => {
                Action::SetQueue(body.read_u32::<BigEndian>()?)
            }
            t if t == OfpActionType::OFPATGroup as u16 => {
                Action::Group(body.read_u32::<BigEndian>()?)
            }
            t if t == OfpActionType::OFPATSetNwTtl as u16 => Action::SetNwTtl(body.read_u8()?),
            t if t == OfpActionType::OFPATDecNwTtl as u16 => Action::DecNwTtl,
            t if t == OfpActionType::OFPATSetField as u16 => {
                Action::SetField(OxmField::parse(&mut body)?)
            }
            t if t == OfpActionType::OFPATPushPbb as u16 => {
                Action::PushPbb(body.read_u16::<BigEndian>()?)
            }
            t if t == OfpActionType::OFPATPopPbb as u16 => Action::PopPbb,
            _ => {
                Action::Unknown {
                    typ,
                    body: body.into_inner().to_vec(),
                }
            }
        };
        Ok(action)
    }

    /// Parse actions until `bytes` is exhausted.
    pub fn parse_sequence(bytes: &mut Reader) -> Result<Vec<Action>, OfpSerializationError> {
        let mut actions = vec![];
        while remaining(bytes) > 0 {
            actions.push(Action::parse(bytes)?);
        }
        Ok(actions)
    }

    pub fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.type_code());
        bytes.put_u16(self.size_of() as u16);
        match *self {
            Action::Output { port, max_len } => {
                port.marshal(bytes);
                bytes.put_u16(max_len);
                bytes.put_bytes(0, 6);
            }
            Action::SetMplsTtl(ttl) |
            Action::SetNwTtl(ttl) => {
                bytes.put_u8(ttl);
                bytes.put_bytes(0, 3);
            }
            Action::PushVlan(ethertype) |
            Action::PushMpls(ethertype) |
            Action::PopMpls(ethertype) |
            Action::PushPbb(ethertype) => {
                bytes.put_u16(ethertype);
                bytes.put_bytes(0, 2);
            }
            Action::SetQueue(id) |
            Action::Group(id) => bytes.put_u32(id),
            Action::SetField(ref oxm) => {
                oxm.marshal(bytes);
                bytes.put_bytes(0, pad8(4 + oxm.size_of()));
            }
            Action::Unknown { ref body, .. } => bytes.put_slice(body),
            Action::CopyTtlOut |
            Action::CopyTtlIn |
            Action::DecMplsTtl |
            Action::PopVlan |
            Action::DecNwTtl |
            Action::PopPbb => bytes.put_bytes(0, 4),
        }
    }

    pub fn marshal_sequence(actions: &[Action], bytes: &mut Vec<u8>) {
        for act in actions {
            act.marshal(bytes)
        }
    }
}

#[repr(u16)]
enum OfpInstructionType {
    OFPITGotoTable = 1,
    OFPITWriteMetadata = 2,
    OFPITWriteActions = 3,
    OFPITApplyActions = 4,
    OFPITClearActions = 5,
    OFPITMeter = 6,
}

/// Flow-entry instructions, executed when a packet matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Instruction {
    GotoTable(u8),
    WriteMetadata { metadata: u64, mask: u64 },
    WriteActions(Vec<Action>),
    ApplyActions(Vec<Action>),
    ClearActions,
    Meter(u32),
    Unknown { typ: u16, body: Vec<u8> },
}

impl Instruction {
    fn type_code(&self) -> u16 {
        let code = match *self {
            Instruction::GotoTable(_) => OfpInstructionType::OFPITGotoTable,
            Instruction::WriteMetadata { .. } => OfpInstructionType::OFPITWriteMetadata,
            Instruction::WriteActions(_) => OfpInstructionType::OFPITWriteActions,
            Instruction::ApplyActions(_) => OfpInstructionType::OFPITApplyActions,
            Instruction::ClearActions => OfpInstructionType::OFPITClearActions,
            Instruction::Meter(_) => OfpInstructionType::OFPITMeter,
            Instruction::Unknown { typ, .. } => return typ,
        };
        code as u16
    }

    pub fn size_of(&self) -> usize {
        match *self {
            Instruction::WriteMetadata { .. } => 24,
            Instruction::WriteActions(ref acts) |
            Instruction::ApplyActions(ref acts) => 8 + Action::size_of_sequence(acts),
            Instruction::Unknown { ref body, .. } => 4 + body.len(),
            Instruction::GotoTable(_) |
            Instruction::ClearActions |
            Instruction::Meter(_) => 8,
        }
    }

    pub fn size_of_sequence(instructions: &[Instruction]) -> usize {
        instructions.iter().map(Instruction::size_of).sum()
    }

    pub fn parse(bytes: &mut Reader) -> Result<Instruction, OfpSerializationError> {
        let typ = bytes.read_u16::<BigEndian>()?;
        let len = bytes.read_u16::<BigEndian>()? as usize;
        check_len("instruction", len, 4, remaining(bytes) + 4)?;
        let mut body = Cursor::new(take(bytes, len - 4)?);
        let instruction = match typ {
            t if t == OfpInstructionType::OFPITGotoTable as u16 => {
                Instruction::GotoTable(body.read_u8()?)
            }
            t if t == OfpInstructionType::OFPITWriteMetadata as u16 => {
                skip(&mut body, 4)?;
                Instruction::WriteMetadata {
                    metadata: body.read_u64::<BigEndian>()?,
                    mask: body.read_u64::<BigEndian>()?,
                }
            }
            t if t == OfpInstructionType::OFPITWriteActions as u16 => {
                skip(&mut body, 4)?;
                Instruction::WriteActions(Action::parse_sequence(&mut body)?)
            }
            t if t == OfpInstructionType::OFPITApplyActions as u16 => {
                skip(&mut body, 4)?;
                Instruction::ApplyActions(Action::parse_sequence(&mut body)?)
            }
            t if t == OfpInstructionType::OFPITClearActions as u16 => Instruction::ClearActions,
            t if t == OfpInstructionType::OFPITMeter as u16 => {
                Instruction::Meter(body.read_u32::<BigEndian>()?)
            }
            _ => {
                Instruction::Unknown {
                    typ,
                    body: body.into_inner().to_vec(),
                }
            }
        };
        Ok(instruction)
    }

    pub fn parse_sequence(bytes: &mut Reader) -> Result<Vec<Instruction>, OfpSerializationError> {
        let mut instructions = vec![];
        while remaining(bytes) > 0 {
            instructions.push(Instruction::parse(bytes)?);
        }
        Ok(instructions)
    }

    pub fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.type_code());
        bytes.put_u16(self.size_of() as u16);
        match *self {
            Instruction::GotoTable(table) => {
                bytes.put_u8(table);
                bytes.put_bytes(0, 3);
            }
            Instruction::WriteMetadata { metadata, mask } => {
                bytes.put_bytes(0, 4);
                bytes.put_u64(metadata);
                bytes.put_u64(mask);
            }
            Instruction::WriteActions(ref acts) |
            Instruction::ApplyActions(ref acts) => {
                bytes.put_bytes(0, 4);
                Action::marshal_sequence(acts, bytes);
            }
            Instruction::ClearActions => bytes.put_bytes(0, 4),
            Instruction::Meter(meter) => bytes.put_u32(meter),
            Instruction::Unknown { ref body, .. } => bytes.put_slice(body),
        }
    }

    pub fn marshal_sequence(instructions: &[Instruction], bytes: &mut Vec<u8>) {
        for instruction in instructions {
            instruction.marshal(bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x04::oxm::Mask;

    #[test]
    fn apply_actions_output() {
        let wire = [
            0x00, 0x04, 0x00, 0x18, 0, 0, 0, 0, // apply-actions, len 24
            0x00, 0x00, 0x00, 0x10, // output, len 16
            0xff, 0xff, 0xff, 0xfd, 0xff, 0xff, // controller, no buffer
            0, 0, 0, 0, 0, 0,
        ];
        let instructions = Instruction::parse_sequence(&mut Cursor::new(&wire[..])).unwrap();
        assert_eq!(instructions, vec![Instruction::ApplyActions(vec![Action::to_controller()])]);
        let mut bytes = vec![];
        Instruction::marshal_sequence(&instructions, &mut bytes);
        assert_eq!(bytes, wire);
        assert_eq!(Instruction::size_of_sequence(&instructions), wire.len());
    }

    #[test]
    fn set_field_is_padded() {
        let act = Action::SetField(OxmField::VlanVid(Mask::exact(0x1005)));
        let mut bytes = vec![];
        act.marshal(&mut bytes);
        assert_eq!(bytes.len(), 16);
        assert_eq!(act.size_of(), 16);
        assert_eq!(Action::parse(&mut Cursor::new(&bytes[..])).unwrap(), act);
    }

    #[test]
    fn unknown_action_keeps_the_cursor_aligned() {
        let wire = [
            0xff, 0xff, 0x00, 0x10, 0x00, 0x00, 0x23, 0x20, 1, 2, 3, 4, 5, 6, 7, 8, // experimenter
            0x00, 0x16, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07, // group 7
        ];
        let actions = Action::parse_sequence(&mut Cursor::new(&wire[..])).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(actions[0], Action::Unknown { typ: 0xffff, .. }));
        assert_eq!(actions[1], Action::Group(7));
        let mut bytes = vec![];
        Action::marshal_sequence(&actions, &mut bytes);
        assert_eq!(bytes, wire);
    }

    #[test]
    fn short_action_length_is_rejected() {
        let wire = [0x00, 0x00, 0x00, 0x02];
        assert!(Action::parse(&mut Cursor::new(&wire[..])).is_err());
    }

    #[test]
    fn goto_and_metadata() {
        let instructions = vec![
            Instruction::WriteMetadata { metadata: 0xaa, mask: 0xff },
            Instruction::GotoTable(2),
            Instruction::Meter(4),
        ];
        let mut bytes = vec![];
        Instruction::marshal_sequence(&instructions, &mut bytes);
        assert_eq!(bytes.len(), Instruction::size_of_sequence(&instructions));
        let parsed = Instruction::parse_sequence(&mut Cursor::new(&bytes[..])).unwrap();
        assert_eq!(parsed, instructions);
    }
}
