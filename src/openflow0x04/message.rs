use bytes::BufMut;

use crate::ofp_header::{OfpHeader, OPENFLOW_0_04_VERSION};
use crate::ofp_message::{OfpMessage, OfpSerializationError};
use super::*;

/// Abstractions of OpenFlow 1.3 messages mapping to message codes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Hello(Hello),
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    Experimenter(Experimenter),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    FlowRemoved(FlowRemoved),
    PortStatus(PortStatus),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    MultipartRequest(MultipartRequest),
    MultipartReply(MultipartReply),
    BarrierRequest,
    BarrierReply,
    RoleRequest(Role),
    RoleReply(Role),
    GetAsyncRequest,
    GetAsyncReply(AsyncConfig),
    SetAsync(AsyncConfig),
}

impl Message {
    /// Map `Message` to associated OpenFlow message type code `MsgCode`.
    pub fn msg_code_of_message(msg: &Message) -> MsgCode {
        match *msg {
            Message::Hello(_) => MsgCode::Hello,
            Message::Error(_) => MsgCode::Error,
            Message::EchoRequest(_) => MsgCode::EchoReq,
            Message::EchoReply(_) => MsgCode::EchoResp,
            Message::Experimenter(_) => MsgCode::Experimenter,
            Message::FeaturesRequest => MsgCode::FeaturesReq,
            Message::FeaturesReply(_) => MsgCode::FeaturesResp,
            Message::GetConfigRequest => MsgCode::GetConfigReq,
            Message::GetConfigReply(_) => MsgCode::GetConfigResp,
            Message::SetConfig(_) => MsgCode::SetConfig,
            Message::PacketIn(_) => MsgCode::PacketIn,
            Message::FlowRemoved(_) => MsgCode::FlowRemoved,
            Message::PortStatus(_) => MsgCode::PortStatus,
            Message::PacketOut(_) => MsgCode::PacketOut,
            Message::FlowMod(_) => MsgCode::FlowMod,
            Message::MultipartRequest(_) => MsgCode::MultipartReq,
            Message::MultipartReply(_) => MsgCode::MultipartResp,
            Message::BarrierRequest => MsgCode::BarrierReq,
            Message::BarrierReply => MsgCode::BarrierResp,
            Message::RoleRequest(_) => MsgCode::RoleReq,
            Message::RoleReply(_) => MsgCode::RoleResp,
            Message::GetAsyncRequest => MsgCode::GetAsyncReq,
            Message::GetAsyncReply(_) => MsgCode::GetAsyncResp,
            Message::SetAsync(_) => MsgCode::SetAsync,
        }
    }

    fn body_size(msg: &Message) -> usize {
        match *msg {
            Message::Hello(ref hello) => hello.size_of(),
            Message::Error(ref err) => err.size_of(),
            Message::EchoRequest(ref buf) |
            Message::EchoReply(ref buf) => buf.len(),
            Message::Experimenter(ref exp) => exp.size_of(),
            Message::FeaturesReply(ref feats) => feats.size_of(),
            Message::GetConfigReply(ref cfg) |
            Message::SetConfig(ref cfg) => cfg.size_of(),
            Message::PacketIn(ref pi) => pi.size_of(),
            Message::FlowRemoved(ref fr) => fr.size_of(),
            Message::PortStatus(ref ps) => ps.size_of(),
            Message::PacketOut(ref po) => po.size_of(),
            Message::FlowMod(ref fm) => fm.size_of(),
            Message::MultipartRequest(ref req) => req.size_of(),
            Message::MultipartReply(ref rep) => rep.size_of(),
            Message::RoleRequest(ref role) |
            Message::RoleReply(ref role) => role.size_of(),
            Message::GetAsyncReply(ref cfg) |
            Message::SetAsync(ref cfg) => cfg.size_of(),
            Message::FeaturesRequest |
            Message::GetConfigRequest |
            Message::BarrierRequest |
            Message::BarrierReply |
            Message::GetAsyncRequest => 0,
        }
    }

    /// Marshal the body of the OpenFlow message `msg`.
    fn marshal_body(msg: &Message, bytes: &mut Vec<u8>) {
        match *msg {
            Message::Hello(ref hello) => hello.marshal(bytes),
            Message::Error(ref err) => err.marshal(bytes),
            Message::EchoRequest(ref buf) |
            Message::EchoReply(ref buf) => bytes.put_slice(buf),
            Message::Experimenter(ref exp) => exp.marshal(bytes),
            Message::FeaturesReply(ref feats) => feats.marshal(bytes),
            Message::GetConfigReply(ref cfg) |
            Message::SetConfig(ref cfg) => cfg.marshal(bytes),
            Message::PacketIn(ref pi) => pi.marshal(bytes),
            Message::FlowRemoved(ref fr) => fr.marshal(bytes),
            Message::PortStatus(ref ps) => ps.marshal(bytes),
            Message::PacketOut(ref po) => po.marshal(bytes),
            Message::FlowMod(ref fm) => fm.marshal(bytes),
            Message::MultipartRequest(ref req) => req.marshal(bytes),
            Message::MultipartReply(ref rep) => rep.marshal(bytes),
            Message::RoleRequest(ref role) |
            Message::RoleReply(ref role) => role.marshal(bytes),
            Message::GetAsyncReply(ref cfg) |
            Message::SetAsync(ref cfg) => cfg.marshal(bytes),
            Message::FeaturesRequest |
            Message::GetConfigRequest |
            Message::BarrierRequest |
            Message::BarrierReply |
            Message::GetAsyncRequest => (),
        }
    }
}

impl OfpMessage for Message {
    fn size_of(msg: &Message) -> usize {
        OfpHeader::size() + Message::body_size(msg)
    }

    /// The length field only holds sizes up to `OFP_MAX_MESSAGE_LEN`; `Datapath` refuses to
    /// queue anything larger.
    fn header_of(xid: u32, msg: &Message) -> OfpHeader {
        OfpHeader::new(OPENFLOW_0_04_VERSION,
                       Message::msg_code_of_message(msg) as u8,
                       Self::size_of(msg) as u16,
                       xid)
    }

    fn marshal(xid: u32, msg: &Message) -> Vec<u8> {
        let header = Self::header_of(xid, msg);
        let mut bytes = Vec::with_capacity(header.length());
        OfpHeader::marshal(&mut bytes, &header);
        Message::marshal_body(msg, &mut bytes);
        bytes
    }

    fn parse(header: &OfpHeader, buf: &[u8]) -> Result<(u32, Message), OfpSerializationError> {
        let body_len = header.length() - OfpHeader::size();
        let buf = buf.get(..body_len)
            .ok_or(OfpSerializationError::InvalidLength {
                what: "message body",
                length: header.length(),
            })?;
        let code = header.type_code()
            .ok_or(OfpSerializationError::UnsupportedMessage { code: header.typ() })?;
        // Hello is the only message a peer may send before the version is agreed.
        if code != MsgCode::Hello && header.version() != OPENFLOW_0_04_VERSION {
            return Err(OfpSerializationError::UnsupportedVersion { version: header.version() });
        }
        let msg = match code {
            MsgCode::Hello => Message::Hello(Hello::parse(buf)?),
            MsgCode::Error => Message::Error(ErrorMsg::parse(buf)?),
            MsgCode::EchoReq => Message::EchoRequest(buf.to_vec()),
            MsgCode::EchoResp => Message::EchoReply(buf.to_vec()),
            MsgCode::Experimenter => Message::Experimenter(Experimenter::parse(buf)?),
            MsgCode::FeaturesReq => Message::FeaturesRequest,
            MsgCode::FeaturesResp => Message::FeaturesReply(SwitchFeatures::parse(buf)?),
            MsgCode::GetConfigReq => Message::GetConfigRequest,
            MsgCode::GetConfigResp => Message::GetConfigReply(SwitchConfig::parse(buf)?),
            MsgCode::SetConfig => Message::SetConfig(SwitchConfig::parse(buf)?),
            MsgCode::PacketIn => Message::PacketIn(PacketIn::parse(buf)?),
            MsgCode::FlowRemoved => Message::FlowRemoved(FlowRemoved::parse(buf)?),
            MsgCode::PortStatus => Message::PortStatus(PortStatus::parse(buf)?),
            MsgCode::PacketOut => Message::PacketOut(PacketOut::parse(buf)?),
            MsgCode::FlowMod => Message::FlowMod(FlowMod::parse(buf)?),
            MsgCode::MultipartReq => Message::MultipartRequest(MultipartRequest::parse(buf)?),
            MsgCode::MultipartResp => Message::MultipartReply(MultipartReply::parse(buf)?),
            MsgCode::BarrierReq => Message::BarrierRequest,
            MsgCode::BarrierResp => Message::BarrierReply,
            MsgCode::RoleReq => Message::RoleRequest(Role::parse(buf)?),
            MsgCode::RoleResp => Message::RoleReply(Role::parse(buf)?),
            MsgCode::GetAsyncReq => Message::GetAsyncRequest,
            MsgCode::GetAsyncResp => Message::GetAsyncReply(AsyncConfig::parse(buf)?),
            MsgCode::SetAsync => Message::SetAsync(AsyncConfig::parse(buf)?),
            MsgCode::GroupMod |
            MsgCode::PortMod |
            MsgCode::TableMod |
            MsgCode::QueueGetConfigReq |
            MsgCode::QueueGetConfigResp |
            MsgCode::MeterMod => {
                return Err(OfpSerializationError::UnsupportedMessage { code: code as u8 })
            }
        };
        Ok((header.xid(), msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openflow0x04::multipart::tests::flow_stats;

    fn decode(bytes: &[u8]) -> Result<(u32, Message), OfpSerializationError> {
        let header = OfpHeader::parse(bytes)?;
        Message::parse(&header, &bytes[OfpHeader::size()..])
    }

    fn assert_consistent(msg: Message) {
        let bytes = Message::marshal(0x1234, &msg);
        assert_eq!(bytes.len(), Message::size_of(&msg), "{:?}", msg);
        let header = OfpHeader::parse(&bytes).unwrap();
        assert_eq!(header.length(), bytes.len());
        assert_eq!(header.version(), OPENFLOW_0_04_VERSION);
        let (xid, parsed) = decode(&bytes).unwrap();
        assert_eq!(xid, 0x1234);
        assert_eq!(parsed, msg);
    }

    #[test]
    fn hello_and_features_request_bytes() {
        assert_eq!(Message::marshal(0, &Message::Hello(Hello::default())),
                   [0x04, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00]);
        assert_eq!(Message::marshal(7, &Message::FeaturesRequest),
                   [0x04, 0x05, 0x00, 0x08, 0x00, 0x00, 0x00, 0x07]);
    }

    #[test]
    fn features_reply_sets_datapath_id() {
        let wire = [
            0x04, 0x06, 0x00, 0x20, 0x00, 0x00, 0x00, 0x01, // header
            0, 0, 0, 0, 0, 0, 0, 1, // datapath id
            0, 0, 1, 0, // n_buffers
            254, 0, 0, 0, // n_tables, auxiliary id, pad
            0, 0, 0, 0x4f, // capabilities
            0, 0, 0, 0, // reserved
        ];
        let (xid, msg) = decode(&wire).unwrap();
        assert_eq!(xid, 1);
        match msg {
            Message::FeaturesReply(ref feats) => {
                assert_eq!(feats.datapath_id, 1);
                assert_eq!(feats.num_buffers, 256);
                assert_eq!(feats.num_tables, 254);
            }
            ref other => panic!("unexpected {:?}", other),
        }
        assert_eq!(Message::marshal(1, &msg), wire);
    }

    #[test]
    fn sizes_match_marshalled_lengths() {
        let msgs = vec![
            Message::Hello(Hello::with_version_bitmap(OPENFLOW_0_04_VERSION)),
            Message::Error(ErrorMsg::hello_incompatible("1.3 only")),
            Message::EchoRequest(vec![1, 2, 3]),
            Message::EchoReply(vec![]),
            Message::FeaturesRequest,
            Message::GetConfigRequest,
            Message::SetConfig(SwitchConfig { flags: 0, miss_send_len: 128 }),
            Message::FlowMod(FlowMod::add_flow(0,
                                               Pattern::match_all(),
                                               vec![Instruction::ApplyActions(vec![Action::to_controller()])])),
            Message::MultipartRequest(MultipartRequest::new(
                MultipartRequestBody::Flow(multipart::FlowStatsRequest::all()))),
            Message::MultipartReply(MultipartReply {
                flags: 0,
                body: MultipartReplyBody::Flow(vec![flow_stats(3, 9)]),
            }),
            Message::BarrierRequest,
            Message::BarrierReply,
            Message::RoleRequest(Role { role: ControllerRole::Master, generation_id: 2 }),
            Message::GetAsyncRequest,
            Message::SetAsync(AsyncConfig::default()),
        ];
        for msg in msgs {
            assert_consistent(msg);
        }
    }

    #[test]
    fn undecoded_types_are_unsupported() {
        // group-mod
        let wire = [0x04, 15, 0x00, 0x08, 0, 0, 0, 0];
        assert!(matches!(decode(&wire), Err(OfpSerializationError::UnsupportedMessage { code: 15 })));
        let wire = [0x04, 99, 0x00, 0x08, 0, 0, 0, 0];
        assert!(matches!(decode(&wire), Err(OfpSerializationError::UnsupportedMessage { code: 99 })));
    }

    #[test]
    fn only_hello_may_carry_another_version() {
        let hello = [0x01, 0x00, 0x00, 0x08, 0, 0, 0, 0];
        assert!(matches!(decode(&hello), Ok((0, Message::Hello(_)))));
        let echo = [0x01, 0x02, 0x00, 0x08, 0, 0, 0, 0];
        assert!(matches!(decode(&echo),
                         Err(OfpSerializationError::UnsupportedVersion { version: 1 })));
    }

    #[test]
    fn short_body_is_rejected() {
        let wire = [0x04, 0x02, 0x00, 0x0c, 0, 0, 0, 0, 1, 2];
        assert!(matches!(decode(&wire), Err(OfpSerializationError::InvalidLength { .. })));
    }
}
