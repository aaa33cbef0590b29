//! Capability-based routing of decoded messages to applications.
//!
//! An application opts into a message kind by implementing the matching handler trait and
//! returning itself from the corresponding `Application::as_*` probe. The dispatcher takes a
//! snapshot of the registry for every message and awaits each matching handler in
//! registration order.
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::ofp_datapath::Datapath;
use crate::openflow0x04::multipart::{AggregateStats, ExperimenterBody, FlowStats, GroupDesc,
                                     GroupFeatures, GroupStats, MeterConfig, MeterFeatures,
                                     MeterStats, PortStats, QueueStats, SwitchDesc,
                                     TableFeatures, TableStats};
use crate::openflow0x04::{AsyncConfig, ErrorMsg, Experimenter, FlowRemoved, Message,
                          MultipartReplyBody, PacketIn, PortDesc, PortStatus, Role,
                          SwitchConfig, SwitchFeatures};

macro_rules! capability {
    // Multipart replies also carry the "more replies follow" flag.
    ($(#[$doc:meta])* $name:ident :: $method:ident(&$msg:ty, more)) => {
        $(#[$doc])*
        #[async_trait]
        pub trait $name: Send + Sync {
            async fn $method(&self, xid: u32, msg: &$msg, more: bool, dp: &Arc<Datapath>);
        }
    };
    ($(#[$doc:meta])* $name:ident :: $method:ident(&$msg:ty)) => {
        $(#[$doc])*
        #[async_trait]
        pub trait $name: Send + Sync {
            async fn $method(&self, xid: u32, msg: &$msg, dp: &Arc<Datapath>);
        }
    };
    ($(#[$doc:meta])* $name:ident :: $method:ident()) => {
        $(#[$doc])*
        #[async_trait]
        pub trait $name: Send + Sync {
            async fn $method(&self, xid: u32, dp: &Arc<Datapath>);
        }
    };
}

capability!(/// Error messages sent by the switch.
            ErrorHandler::handle_error(&ErrorMsg));
capability!(EchoRequestHandler::handle_echo_request(&[u8]));
capability!(EchoReplyHandler::handle_echo_reply(&[u8]));
capability!(ExperimenterHandler::handle_experimenter(&Experimenter));
capability!(/// Features replies. The datapath id is already recorded on the `Datapath`.
            SwitchFeaturesHandler::handle_switch_features(&SwitchFeatures));
capability!(GetConfigReplyHandler::handle_get_config_reply(&SwitchConfig));
capability!(PacketInHandler::handle_packet_in(&PacketIn));
capability!(FlowRemovedHandler::handle_flow_removed(&FlowRemoved));
capability!(PortStatusHandler::handle_port_status(&PortStatus));
capability!(BarrierReplyHandler::handle_barrier_reply());
capability!(RoleReplyHandler::handle_role_reply(&Role));
capability!(GetAsyncReplyHandler::handle_get_async_reply(&AsyncConfig));

capability!(DescStatsHandler::handle_desc_stats(&SwitchDesc, more));
capability!(FlowStatsHandler::handle_flow_stats(&[FlowStats], more));
capability!(AggregateStatsHandler::handle_aggregate_stats(&AggregateStats, more));
capability!(TableStatsHandler::handle_table_stats(&[TableStats], more));
capability!(PortStatsHandler::handle_port_stats(&[PortStats], more));
capability!(QueueStatsHandler::handle_queue_stats(&[QueueStats], more));
capability!(GroupStatsHandler::handle_group_stats(&[GroupStats], more));
capability!(GroupDescHandler::handle_group_desc(&[GroupDesc], more));
capability!(GroupFeaturesHandler::handle_group_features(&GroupFeatures, more));
capability!(MeterStatsHandler::handle_meter_stats(&[MeterStats], more));
capability!(MeterConfigHandler::handle_meter_config(&[MeterConfig], more));
capability!(MeterFeaturesHandler::handle_meter_features(&MeterFeatures, more));
capability!(TableFeaturesHandler::handle_table_features(&[TableFeatures], more));
capability!(PortDescHandler::handle_port_desc(&[PortDesc], more));
capability!(ExperimenterStatsHandler::handle_experimenter_stats(&ExperimenterBody, more));

macro_rules! probes {
    ($($probe:ident: $cap:ident),* $(,)?) => {
        $(
            fn $probe(&self) -> Option<&dyn $cap> {
                None
            }
        )*
    };
}

/// A network application. Every probe defaults to `None`; override the ones whose handler
/// trait the application implements, returning `Some(self)`.
pub trait Application: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str;

    probes! {
        as_error_handler: ErrorHandler,
        as_echo_request_handler: EchoRequestHandler,
        as_echo_reply_handler: EchoReplyHandler,
        as_experimenter_handler: ExperimenterHandler,
        as_switch_features_handler: SwitchFeaturesHandler,
        as_get_config_reply_handler: GetConfigReplyHandler,
        as_packet_in_handler: PacketInHandler,
        as_flow_removed_handler: FlowRemovedHandler,
        as_port_status_handler: PortStatusHandler,
        as_barrier_reply_handler: BarrierReplyHandler,
        as_role_reply_handler: RoleReplyHandler,
        as_get_async_reply_handler: GetAsyncReplyHandler,
        as_desc_stats_handler: DescStatsHandler,
        as_flow_stats_handler: FlowStatsHandler,
        as_aggregate_stats_handler: AggregateStatsHandler,
        as_table_stats_handler: TableStatsHandler,
        as_port_stats_handler: PortStatsHandler,
        as_queue_stats_handler: QueueStatsHandler,
        as_group_stats_handler: GroupStatsHandler,
        as_group_desc_handler: GroupDescHandler,
        as_group_features_handler: GroupFeaturesHandler,
        as_meter_stats_handler: MeterStatsHandler,
        as_meter_config_handler: MeterConfigHandler,
        as_meter_features_handler: MeterFeaturesHandler,
        as_table_features_handler: TableFeaturesHandler,
        as_port_desc_handler: PortDescHandler,
        as_experimenter_stats_handler: ExperimenterStatsHandler,
    }
}

/// Registered applications, in registration order.
///
/// Registration swaps in a new list, so a snapshot taken by an in-flight dispatch is never
/// mutated underneath it.
#[derive(Default)]
pub struct Registry {
    apps: RwLock<Arc<Vec<Arc<dyn Application>>>>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Append `app`. The same application may be registered more than once.
    pub fn register(&self, app: Arc<dyn Application>) {
        let mut apps = self.apps.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(apps.len() + 1);
        next.extend(apps.iter().cloned());
        next.push(app);
        *apps = Arc::new(next);
    }

    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn Application>>> {
        self.apps.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

macro_rules! route {
    ($apps:expr, $probe:ident, |$h:ident| $call:expr) => {{
        let mut invoked = 0;
        for app in $apps.iter() {
            if let Some($h) = app.$probe() {
                trace!(app = app.name(), "invoking {}", stringify!($probe));
                $call.await;
                invoked += 1;
            }
        }
        invoked
    }};
}

/// Routes decoded messages to the applications in a `Registry`.
pub struct Dispatcher {
    registry: Arc<Registry>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Dispatcher {
        Dispatcher { registry }
    }

    /// Deliver `msg` to every application implementing its capability. Returns the number of
    /// handler invocations.
    pub async fn dispatch(&self, xid: u32, msg: &Message, dp: &Arc<Datapath>) -> usize {
        let apps = self.registry.snapshot();
        let invoked = match *msg {
            Message::Error(ref err) => {
                route!(apps, as_error_handler, |h| h.handle_error(xid, err, dp))
            }
            Message::EchoRequest(ref data) => {
                route!(apps, as_echo_request_handler, |h| h.handle_echo_request(xid, data, dp))
            }
            Message::EchoReply(ref data) => {
                route!(apps, as_echo_reply_handler, |h| h.handle_echo_reply(xid, data, dp))
            }
            Message::Experimenter(ref exp) => {
                route!(apps, as_experimenter_handler, |h| h.handle_experimenter(xid, exp, dp))
            }
            Message::FeaturesReply(ref feats) => {
                route!(apps,
                       as_switch_features_handler,
                       |h| h.handle_switch_features(xid, feats, dp))
            }
            Message::GetConfigReply(ref cfg) => {
                route!(apps,
                       as_get_config_reply_handler,
                       |h| h.handle_get_config_reply(xid, cfg, dp))
            }
            Message::PacketIn(ref pi) => {
                route!(apps, as_packet_in_handler, |h| h.handle_packet_in(xid, pi, dp))
            }
            Message::FlowRemoved(ref fr) => {
                route!(apps, as_flow_removed_handler, |h| h.handle_flow_removed(xid, fr, dp))
            }
            Message::PortStatus(ref ps) => {
                route!(apps, as_port_status_handler, |h| h.handle_port_status(xid, ps, dp))
            }
            Message::BarrierReply => {
                route!(apps, as_barrier_reply_handler, |h| h.handle_barrier_reply(xid, dp))
            }
            Message::RoleReply(ref role) => {
                route!(apps, as_role_reply_handler, |h| h.handle_role_reply(xid, role, dp))
            }
            Message::GetAsyncReply(ref cfg) => {
                route!(apps,
                       as_get_async_reply_handler,
                       |h| h.handle_get_async_reply(xid, cfg, dp))
            }
            Message::MultipartReply(ref reply) => {
                let more = reply.more();
                match reply.body {
                    MultipartReplyBody::Desc(ref desc) => {
                        route!(apps,
                               as_desc_stats_handler,
                               |h| h.handle_desc_stats(xid, desc, more, dp))
                    }
                    MultipartReplyBody::Flow(ref stats) => {
                        route!(apps,
                               as_flow_stats_handler,
                               |h| h.handle_flow_stats(xid, stats, more, dp))
                    }
                    MultipartReplyBody::Aggregate(ref stats) => {
                        route!(apps,
                               as_aggregate_stats_handler,
                               |h| h.handle_aggregate_stats(xid, stats, more, dp))
                    }
                    MultipartReplyBody::Table(ref stats) => {
                        route!(apps,
                               as_table_stats_handler,
                               |h| h.handle_table_stats(xid, stats, more, dp))
                    }
                    MultipartReplyBody::PortStats(ref stats) => {
                        route!(apps,
                               as_port_stats_handler,
                               |h| h.handle_port_stats(xid, stats, more, dp))
                    }
                    MultipartReplyBody::Queue(ref stats) => {
                        route!(apps,
                               as_queue_stats_handler,
                               |h| h.handle_queue_stats(xid, stats, more, dp))
                    }
                    MultipartReplyBody::Group(ref stats) => {
                        route!(apps,
                               as_group_stats_handler,
                               |h| h.handle_group_stats(xid, stats, more, dp))
                    }
                    MultipartReplyBody::GroupDesc(ref descs) => {
                        route!(apps,
                               as_group_desc_handler,
                               |h| h.handle_group_desc(xid, descs, more, dp))
                    }
                    MultipartReplyBody::GroupFeatures(ref feats) => {
                        route!(apps,
                               as_group_features_handler,
                               |h| h.handle_group_features(xid, feats, more, dp))
                    }
                    MultipartReplyBody::Meter(ref stats) => {
                        route!(apps,
                               as_meter_stats_handler,
                               |h| h.handle_meter_stats(xid, stats, more, dp))
                    }
                    MultipartReplyBody::MeterConfig(ref cfgs) => {
                        route!(apps,
                               as_meter_config_handler,
                               |h| h.handle_meter_config(xid, cfgs, more, dp))
                    }
                    MultipartReplyBody::MeterFeatures(ref feats) => {
                        route!(apps,
                               as_meter_features_handler,
                               |h| h.handle_meter_features(xid, feats, more, dp))
                    }
                    MultipartReplyBody::TableFeatures(ref feats) => {
                        route!(apps,
                               as_table_features_handler,
                               |h| h.handle_table_features(xid, feats, more, dp))
                    }
                    MultipartReplyBody::PortDesc(ref ports) => {
                        route!(apps,
                               as_port_desc_handler,
                               |h| h.handle_port_desc(xid, ports, more, dp))
                    }
                    MultipartReplyBody::Experimenter(ref exp) => {
                        route!(apps,
                               as_experimenter_stats_handler,
                               |h| h.handle_experimenter_stats(xid, exp, more, dp))
                    }
                }
            }
            ref other => {
                debug!(xid,
                       code = ?Message::msg_code_of_message(other),
                       "no route for message, dropping");
                return 0;
            }
        };
        if invoked == 0 {
            trace!(xid, code = ?Message::msg_code_of_message(msg), "no application handled message");
        }
        invoked
    }
}
