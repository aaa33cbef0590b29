use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::ofp_datapath::{Datapath, DatapathError};
use crate::ofp_dispatch::{Application, ErrorHandler, PacketInHandler, PortStatusHandler,
                          SwitchFeaturesHandler};
use crate::openflow0x04::oxm::MacAddr;
use crate::openflow0x04::{Action, ErrorMsg, FlowMod, Instruction, Mask, Message, OxmField,
                          PacketIn, PacketOut, Pattern, Payload, PortReason, PortStatus,
                          PseudoPort, SwitchFeatures};
use crate::packet::{is_broadcast, is_multicast, Packet};

const LEARNED_FLOW_PRIORITY: u16 = 10;
const TABLE_MISS_PRIORITY: u16 = 0;

/// MAC learning switch.
///
/// Every switch gets a table-miss entry that sends packets to the controller. Source addresses
/// are learned per switch; packets to a known destination install a pair of flows and are
/// forwarded, everything else is flooded.
#[derive(Debug, Default)]
pub struct LearningSwitch {
    known_hosts: Mutex<HashMap<u64, HashMap<MacAddr, u32>>>,
}

impl LearningSwitch {
    pub fn new() -> LearningSwitch {
        LearningSwitch::default()
    }

    /// Port `mac` was last seen on at switch `sw`.
    pub fn host_port(&self, sw: u64, mac: &MacAddr) -> Option<u32> {
        let hosts = self.known_hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.get(&sw).and_then(|table| table.get(mac)).copied()
    }

    fn learn(&self, sw: u64, mac: MacAddr, port: u32) {
        if is_multicast(&mac) {
            return;
        }
        let mut hosts = self.known_hosts.lock().unwrap_or_else(PoisonError::into_inner);
        if hosts.entry(sw).or_default().insert(mac, port) != Some(port) {
            debug!(datapath_id = sw, mac = ?mac, port, "learned host");
        }
    }

    /// Drop everything learned about switch `sw`.
    fn forget_switch(&self, sw: u64) {
        let mut hosts = self.known_hosts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = hosts.remove(&sw) {
            debug!(datapath_id = sw, hosts = table.len(), "forgot hosts of previous connection");
        }
    }

    fn forget_port(&self, sw: u64, port: u32) {
        let mut hosts = self.known_hosts.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = hosts.get_mut(&sw) {
            table.retain(|_, p| *p != port);
        }
    }

    async fn route(&self, sw: u64, pkt: &PacketIn, dp: &Arc<Datapath>) -> Result<(), DatapathError> {
        let in_port = match pkt.in_port() {
            Some(port) => port,
            None => {
                warn!(datapath_id = sw, "packet in without an in_port");
                return Ok(());
            }
        };
        let pk = match Packet::parse(pkt.input_payload.bytes()) {
            Ok(pk) => pk,
            Err(e) => {
                debug!(datapath_id = sw, "ignoring packet: {}", e);
                return Ok(());
            }
        };
        self.learn(sw, pk.dl_src, in_port);

        if is_broadcast(&pk.dl_dst) {
            return send_packet_out(dp, pkt, in_port, PseudoPort::Flood).await;
        }
        let out_port = match self.host_port(sw, &pk.dl_dst) {
            Some(port) if port != in_port => port,
            _ => {
                debug!(datapath_id = sw, dst = ?pk.dl_dst, "flooding");
                return send_packet_out(dp, pkt, in_port, PseudoPort::Flood).await;
            }
        };

        info!(datapath_id = sw, src = ?pk.dl_src, dst = ?pk.dl_dst, "installing rules");
        let towards_dst = Pattern::match_all()
            .with(OxmField::EthDst(Mask::exact(pk.dl_dst)))
            .with(OxmField::EthSrc(Mask::exact(pk.dl_src)));
        let towards_src = Pattern::match_all()
            .with(OxmField::EthDst(Mask::exact(pk.dl_src)))
            .with(OxmField::EthSrc(Mask::exact(pk.dl_dst)));
        dp.send(Message::FlowMod(output_flow(towards_dst, out_port))).await?;
        dp.send(Message::FlowMod(output_flow(towards_src, in_port))).await?;
        send_packet_out(dp, pkt, in_port, PseudoPort::PhysicalPort(out_port)).await
    }
}

fn output_flow(pattern: Pattern, port: u32) -> FlowMod {
    let actions = vec![Action::output(PseudoPort::PhysicalPort(port))];
    FlowMod::add_flow(LEARNED_FLOW_PRIORITY, pattern, vec![Instruction::ApplyActions(actions)])
}

async fn send_packet_out(dp: &Arc<Datapath>,
                         pkt: &PacketIn,
                         in_port: u32,
                         out: PseudoPort)
                         -> Result<(), DatapathError> {
    // A buffered packet is released by id alone.
    let output_payload = match pkt.input_payload {
        Payload::Buffered(id, _) => Payload::Buffered(id, vec![]),
        Payload::NotBuffered(ref data) => Payload::NotBuffered(data.clone()),
    };
    let pkt_out = PacketOut {
        output_payload,
        in_port: PseudoPort::PhysicalPort(in_port),
        apply_actions: vec![Action::output(out)],
    };
    dp.send(Message::PacketOut(pkt_out)).await.map(|_| ())
}

#[async_trait]
impl SwitchFeaturesHandler for LearningSwitch {
    async fn handle_switch_features(&self, _: u32, feats: &SwitchFeatures, dp: &Arc<Datapath>) {
        // Ports may have been rewired while the switch was away.
        self.forget_switch(feats.datapath_id);
        let table_miss = FlowMod::add_flow(TABLE_MISS_PRIORITY,
                                           Pattern::match_all(),
                                           vec![Instruction::ApplyActions(vec![Action::to_controller()])]);
        if let Err(e) = dp.send(Message::FlowMod(table_miss)).await {
            warn!(datapath_id = feats.datapath_id, "failed to install table-miss flow: {}", e);
        }
    }
}

#[async_trait]
impl PacketInHandler for LearningSwitch {
    async fn handle_packet_in(&self, _: u32, pkt: &PacketIn, dp: &Arc<Datapath>) {
        let sw = match dp.datapath_id() {
            Some(sw) => sw,
            None => {
                debug!("packet in before features reply");
                return;
            }
        };
        if let Err(e) = self.route(sw, pkt, dp).await {
            warn!(datapath_id = sw, "packet in not handled: {}", e);
        }
    }
}

#[async_trait]
impl PortStatusHandler for LearningSwitch {
    async fn handle_port_status(&self, _: u32, ps: &PortStatus, dp: &Arc<Datapath>) {
        if let (PortReason::PortDelete, Some(sw)) = (ps.reason, dp.datapath_id()) {
            self.forget_port(sw, ps.desc.port_no);
        }
    }
}

#[async_trait]
impl ErrorHandler for LearningSwitch {
    async fn handle_error(&self, xid: u32, err: &ErrorMsg, dp: &Arc<Datapath>) {
        warn!(xid,
              datapath_id = ?dp.datapath_id(),
              typ = ?err.error_type(),
              code = err.code,
              "switch reported an error");
    }
}

impl Application for LearningSwitch {
    fn name(&self) -> &str {
        "learning_switch"
    }

    fn as_switch_features_handler(&self) -> Option<&dyn SwitchFeaturesHandler> {
        Some(self)
    }

    fn as_packet_in_handler(&self) -> Option<&dyn PacketInHandler> {
        Some(self)
    }

    fn as_port_status_handler(&self) -> Option<&dyn PortStatusHandler> {
        Some(self)
    }

    fn as_error_handler(&self) -> Option<&dyn ErrorHandler> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::ofp_datapath::Outbound;
    use crate::openflow0x04::{Capabilities, PacketInReason};

    const HOST_A: MacAddr = [0, 0, 0, 0, 0, 0xa];
    const HOST_B: MacAddr = [0, 0, 0, 0, 0, 0xb];

    fn frame(dst: MacAddr, src: MacAddr) -> Vec<u8> {
        let mut frame = dst.to_vec();
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&[0x88, 0xb5, 0, 0]);
        frame
    }

    fn packet_in(in_port: u32, dst: MacAddr, src: MacAddr) -> PacketIn {
        let data = frame(dst, src);
        PacketIn {
            total_len: data.len() as u16,
            input_payload: Payload::NotBuffered(data),
            reason: PacketInReason::NoMatch,
            table_id: 0,
            cookie: 0,
            pattern: Pattern::match_all().with(OxmField::InPort(in_port)),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Message> {
        let mut out = vec![];
        while let Ok(Outbound::Message { message, .. }) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    fn outputs(po: &PacketOut) -> Vec<PseudoPort> {
        po.apply_actions
            .iter()
            .filter_map(|a| match *a {
                Action::Output { port, .. } => Some(port),
                _ => None,
            })
            .collect()
    }

    fn features(datapath_id: u64) -> SwitchFeatures {
        SwitchFeatures {
            datapath_id,
            num_buffers: 0,
            num_tables: 1,
            auxiliary_id: 0,
            supported_capabilities: Capabilities::default(),
            reserved: 0,
        }
    }

    #[tokio::test]
    async fn installs_table_miss_on_connect() {
        let (dp, mut rx) = Datapath::channel("127.0.0.1:6653".parse().unwrap(), 8);
        LearningSwitch::new().handle_switch_features(1, &features(1), &dp).await;
        match drain(&mut rx).as_slice() {
            [Message::FlowMod(fm)] => {
                assert_eq!(fm.priority, TABLE_MISS_PRIORITY);
                assert_eq!(fm.pattern, Pattern::match_all());
                assert_eq!(fm.instructions,
                           vec![Instruction::ApplyActions(vec![Action::to_controller()])]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn floods_unknown_then_installs_known() {
        let (dp, mut rx) = Datapath::channel("127.0.0.1:6653".parse().unwrap(), 8);
        let switch = LearningSwitch::new();

        switch.route(1, &packet_in(1, HOST_B, HOST_A), &dp).await.unwrap();
        assert_eq!(switch.host_port(1, &HOST_A), Some(1));
        match drain(&mut rx).as_slice() {
            [Message::PacketOut(po)] => assert_eq!(outputs(po), [PseudoPort::Flood]),
            other => panic!("unexpected {:?}", other),
        }

        switch.route(1, &packet_in(2, HOST_A, HOST_B), &dp).await.unwrap();
        assert_eq!(switch.host_port(1, &HOST_B), Some(2));
        match drain(&mut rx).as_slice() {
            [Message::FlowMod(to_a), Message::FlowMod(to_b), Message::PacketOut(po)] => {
                assert_eq!(to_a.priority, LEARNED_FLOW_PRIORITY);
                assert!(to_a.pattern.fields.contains(&OxmField::EthDst(Mask::exact(HOST_A))));
                assert!(to_b.pattern.fields.contains(&OxmField::EthDst(Mask::exact(HOST_B))));
                assert_eq!(outputs(po), [PseudoPort::PhysicalPort(1)]);
                assert_eq!(po.in_port, PseudoPort::PhysicalPort(2));
            }
            other => panic!("unexpected {:?}", other),
        }
        // Other switches learn independently.
        assert_eq!(switch.host_port(2, &HOST_A), None);
    }

    #[tokio::test]
    async fn reconnect_starts_from_an_empty_table() {
        let (dp, mut rx) = Datapath::channel("127.0.0.1:6653".parse().unwrap(), 8);
        let switch = LearningSwitch::new();
        switch.learn(1, HOST_A, 3);
        switch.learn(2, HOST_B, 4);

        switch.handle_switch_features(1, &features(1), &dp).await;
        drain(&mut rx);
        assert_eq!(switch.host_port(1, &HOST_A), None);
        assert_eq!(switch.host_port(2, &HOST_B), Some(4));
    }

    #[tokio::test]
    async fn broadcast_is_flooded() {
        let (dp, mut rx) = Datapath::channel("127.0.0.1:6653".parse().unwrap(), 8);
        let switch = LearningSwitch::new();
        switch.route(1, &packet_in(5, [0xff; 6], HOST_A), &dp).await.unwrap();
        match drain(&mut rx).as_slice() {
            [Message::PacketOut(po)] => assert_eq!(outputs(po), [PseudoPort::Flood]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(switch.host_port(1, &HOST_A), Some(5));
    }

    #[test]
    fn deleted_port_is_forgotten() {
        let switch = LearningSwitch::new();
        switch.learn(1, HOST_A, 3);
        switch.learn(1, HOST_B, 4);
        switch.learn(1, [0x01, 0, 0x5e, 0, 0, 1], 3);
        switch.forget_port(1, 3);
        assert_eq!(switch.host_port(1, &HOST_A), None);
        assert_eq!(switch.host_port(1, &HOST_B), Some(4));
    }
}
