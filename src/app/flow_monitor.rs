use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, info_span, Instrument};

use crate::ofp_datapath::Datapath;
use crate::ofp_dispatch::{AggregateStatsHandler, Application, FlowStatsHandler, PortStatsHandler,
                          SwitchFeaturesHandler};
use crate::openflow0x04::multipart::{AggregateStats, FlowStats, FlowStatsRequest, PortStats};
use crate::openflow0x04::{Message, MultipartRequest, MultipartRequestBody, PseudoPort,
                          SwitchFeatures};

/// The polling task for one connection of a switch.
#[derive(Debug)]
struct Poller {
    dp: Arc<Datapath>,
    task: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Monitored {
    pollers: HashMap<u64, Poller>,
    aggregates: HashMap<u64, AggregateStats>,
}

/// Polls every connected switch for flow, aggregate and port statistics and logs the replies.
#[derive(Debug)]
pub struct FlowMonitor {
    interval: Duration,
    state: Arc<Mutex<Monitored>>,
}

impl FlowMonitor {
    pub fn new(interval: Duration) -> FlowMonitor {
        FlowMonitor {
            interval,
            state: Arc::new(Mutex::new(Monitored::default())),
        }
    }

    /// Whether a polling task is running for switch `sw`.
    pub fn is_monitoring(&self, sw: u64) -> bool {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).pollers.contains_key(&sw)
    }

    /// Most recent aggregate statistics reported by switch `sw`.
    pub fn last_aggregate(&self, sw: u64) -> Option<AggregateStats> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).aggregates.get(&sw).copied()
    }

    fn requests() -> [MultipartRequestBody; 3] {
        [MultipartRequestBody::Flow(FlowStatsRequest::all()),
         MultipartRequestBody::Aggregate(FlowStatsRequest::all()),
         MultipartRequestBody::PortStats { port_no: PseudoPort::Any.to_int() }]
    }
}

async fn poll(dp: Arc<Datapath>, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        for body in FlowMonitor::requests() {
            if let Err(e) = dp.send(Message::MultipartRequest(MultipartRequest::new(body))).await {
                debug!("stopping statistics polling: {}", e);
                return;
            }
        }
    }
}

#[async_trait]
impl SwitchFeaturesHandler for FlowMonitor {
    async fn handle_switch_features(&self, _: u32, feats: &SwitchFeatures, dp: &Arc<Datapath>) {
        let sw = feats.datapath_id;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(poller) = state.pollers.get(&sw) {
            if Arc::ptr_eq(&poller.dp, dp) {
                return;
            }
            // The switch reconnected before its old poller saw the connection drop.
            debug!(datapath_id = sw, "replacing poller of previous connection");
            poller.task.abort();
        }
        let shared = self.state.clone();
        let conn = dp.clone();
        let period = self.interval;
        let task = tokio::spawn(async move {
                poll(conn.clone(), period).await;
                let mut state = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if state.pollers.get(&sw).is_some_and(|p| Arc::ptr_eq(&p.dp, &conn)) {
                    state.pollers.remove(&sw);
                    state.aggregates.remove(&sw);
                }
            }
            .instrument(info_span!("flow_monitor", datapath_id = sw)));
        state.pollers.insert(sw, Poller { dp: dp.clone(), task });
    }
}

#[async_trait]
impl FlowStatsHandler for FlowMonitor {
    async fn handle_flow_stats(&self, _: u32, stats: &[FlowStats], _: bool, dp: &Arc<Datapath>) {
        for flow in stats {
            info!(datapath_id = ?dp.datapath_id(),
                  table = flow.table_id,
                  priority = flow.priority,
                  packets = flow.packet_count,
                  bytes = flow.byte_count,
                  duration = flow.duration_sec,
                  "flow");
        }
    }
}

#[async_trait]
impl AggregateStatsHandler for FlowMonitor {
    async fn handle_aggregate_stats(&self,
                                    _: u32,
                                    stats: &AggregateStats,
                                    _: bool,
                                    dp: &Arc<Datapath>) {
        info!(datapath_id = ?dp.datapath_id(),
              flows = stats.flow_count,
              packets = stats.packet_count,
              bytes = stats.byte_count,
              "aggregate");
        if let Some(sw) = dp.datapath_id() {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .aggregates
                .insert(sw, *stats);
        }
    }
}

#[async_trait]
impl PortStatsHandler for FlowMonitor {
    async fn handle_port_stats(&self, _: u32, stats: &[PortStats], _: bool, dp: &Arc<Datapath>) {
        for port in stats {
            info!(datapath_id = ?dp.datapath_id(),
                  port = port.port_no,
                  rx_packets = port.rx_packets,
                  tx_packets = port.tx_packets,
                  rx_dropped = port.rx_dropped,
                  tx_dropped = port.tx_dropped,
                  "port");
        }
    }
}

impl Application for FlowMonitor {
    fn name(&self) -> &str {
        "flow_monitor"
    }

    fn as_switch_features_handler(&self) -> Option<&dyn SwitchFeaturesHandler> {
        Some(self)
    }

    fn as_flow_stats_handler(&self) -> Option<&dyn FlowStatsHandler> {
        Some(self)
    }

    fn as_aggregate_stats_handler(&self) -> Option<&dyn AggregateStatsHandler> {
        Some(self)
    }

    fn as_port_stats_handler(&self) -> Option<&dyn PortStatsHandler> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ofp_datapath::Outbound;
    use crate::openflow0x04::{Capabilities, MultipartType};

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

    async fn next_request(rx: &mut tokio::sync::mpsc::Receiver<Outbound>) -> MultipartType {
        match rx.recv().await {
            Some(Outbound::Message { message: Message::MultipartRequest(req), .. }) => {
                req.body.multipart_type()
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_the_connection_goes_away() {
        let monitor = FlowMonitor::new(Duration::from_secs(10));
        let (dp, mut rx) = Datapath::channel("127.0.0.1:6653".parse().unwrap(), 8);
        monitor.handle_switch_features(1, &features(7), &dp).await;
        // A second features reply does not start a second poller.
        monitor.handle_switch_features(2, &features(7), &dp).await;
        assert!(monitor.is_monitoring(7));

        for _ in 0..2 {
            assert_eq!(next_request(&mut rx).await, MultipartType::Flow);
            assert_eq!(next_request(&mut rx).await, MultipartType::Aggregate);
            assert_eq!(next_request(&mut rx).await, MultipartType::PortStats);
        }

        drop(rx);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!monitor.is_monitoring(7));
    }

    #[tokio::test(start_paused = true)]
    async fn reconnecting_switch_gets_a_new_poller() {
        let monitor = FlowMonitor::new(Duration::from_secs(10));
        let (old, old_rx) = Datapath::channel("127.0.0.1:6653".parse().unwrap(), 8);
        monitor.handle_switch_features(1, &features(7), &old).await;
        tokio::task::yield_now().await;
        drop(old_rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let (new, mut new_rx) = Datapath::channel("127.0.0.1:6654".parse().unwrap(), 64);
        monitor.handle_switch_features(1, &features(7), &new).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(monitor.is_monitoring(7));
        let mut requests = 0;
        while let Ok(Outbound::Message { .. }) = new_rx.try_recv() {
            requests += 1;
        }
        assert!(requests >= 3, "only {} requests reached the new connection", requests);
    }
}
