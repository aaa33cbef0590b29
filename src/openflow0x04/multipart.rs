//! Multipart (statistics) requests and replies.
//!
//! Both directions share an 8-byte prefix after the OpenFlow header: the multipart type,
//! a flags word (`OFPMPF_*_MORE` in bit 0) and four bytes of padding. The rest of the
//! message is the per-type body, which for most replies is a list of records repeated
//! until the message length is exhausted.
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use bytes::BufMut;

use crate::bits::{pad8, test_bit};
use crate::ofp_message::OfpSerializationError;
use super::action::{Action, Instruction};
use super::features::PortDesc;
use super::flow::FlowModFlags;
use super::oxm::Pattern;
use super::{check_len, put_string, read_string, remaining, rest, skip, take, MessageType,
            PseudoPort, Reader, Timeout, OFPG_ANY, OFPTT_ALL};

/// Multipart sub-type discriminant.
#[repr(u16)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MultipartType {
    Desc = 0,
    Flow = 1,
    Aggregate = 2,
    Table = 3,
    PortStats = 4,
    Queue = 5,
    Group = 6,
    GroupDesc = 7,
    GroupFeatures = 8,
    Meter = 9,
    MeterConfig = 10,
    MeterFeatures = 11,
    TableFeatures = 12,
    PortDesc = 13,
    Experimenter = 0xffff,
}

impl MultipartType {
    pub fn of_int(typ: u16) -> Option<MultipartType> {
        let t = match typ {
            0 => MultipartType::Desc,
            1 => MultipartType::Flow,
            2 => MultipartType::Aggregate,
            3 => MultipartType::Table,
            4 => MultipartType::PortStats,
            5 => MultipartType::Queue,
            6 => MultipartType::Group,
            7 => MultipartType::GroupDesc,
            8 => MultipartType::GroupFeatures,
            9 => MultipartType::Meter,
            10 => MultipartType::MeterConfig,
            11 => MultipartType::MeterFeatures,
            12 => MultipartType::TableFeatures,
            13 => MultipartType::PortDesc,
            0xffff => MultipartType::Experimenter,
            _ => return None,
        };
        Some(t)
    }
}

fn parse_list<T, F>(bytes: &mut Reader, parse: F) -> Result<Vec<T>, OfpSerializationError>
    where F: Fn(&mut Reader) -> Result<T, OfpSerializationError>
{
    let mut v = vec![];
    while remaining(bytes) > 0 {
        v.push(parse(bytes)?);
    }
    Ok(v)
}

/// Read a record's own `u16` length (already consumed `read` bytes of it) and return a
/// cursor over the rest of the record.
fn record<'a>(bytes: &mut Reader<'a>,
              what: &'static str,
              length: usize,
              min: usize,
              read: usize)
              -> Result<Reader<'a>, OfpSerializationError> {
    check_len(what, length, min, remaining(bytes) + read)?;
    Ok(Cursor::new(take(bytes, length - read)?))
}

/// Vendor-specific multipart body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExperimenterBody {
    pub experimenter: u32,
    pub exp_type: u32,
    pub data: Vec<u8>,
}

impl ExperimenterBody {
    fn size_of(&self) -> usize {
        8 + self.data.len()
    }

    fn parse(bytes: &mut Reader) -> Result<ExperimenterBody, OfpSerializationError> {
        Ok(ExperimenterBody {
            experimenter: bytes.read_u32::<BigEndian>()?,
            exp_type: bytes.read_u32::<BigEndian>()?,
            data: rest(bytes).to_vec(),
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.experimenter);
        bytes.put_u32(self.exp_type);
        bytes.put_slice(&self.data);
    }
}

/// Flow and aggregate statistics request body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowStatsRequest {
    pub table_id: u8,
    pub out_port: PseudoPort,
    pub out_group: u32,
    pub cookie: u64,
    pub cookie_mask: u64,
    pub pattern: Pattern,
}

impl FlowStatsRequest {
    /// Every flow in every table.
    pub fn all() -> FlowStatsRequest {
        FlowStatsRequest {
            table_id: OFPTT_ALL,
            out_port: PseudoPort::Any,
            out_group: OFPG_ANY,
            cookie: 0,
            cookie_mask: 0,
            pattern: Pattern::match_all(),
        }
    }

    fn size_of(&self) -> usize {
        32 + self.pattern.size_of()
    }

    fn parse(bytes: &mut Reader) -> Result<FlowStatsRequest, OfpSerializationError> {
        let table_id = bytes.read_u8()?;
        skip(bytes, 3)?;
        let out_port = PseudoPort::of_int(bytes.read_u32::<BigEndian>()?)?;
        let out_group = bytes.read_u32::<BigEndian>()?;
        skip(bytes, 4)?;
        let cookie = bytes.read_u64::<BigEndian>()?;
        let cookie_mask = bytes.read_u64::<BigEndian>()?;
        let pattern = Pattern::parse(bytes)?;
        Ok(FlowStatsRequest {
            table_id,
            out_port,
            out_group,
            cookie,
            cookie_mask,
            pattern,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u8(self.table_id);
        bytes.put_bytes(0, 3);
        self.out_port.marshal(bytes);
        bytes.put_u32(self.out_group);
        bytes.put_bytes(0, 4);
        bytes.put_u64(self.cookie);
        bytes.put_u64(self.cookie_mask);
        self.pattern.marshal(bytes);
    }
}

/// Multipart request bodies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MultipartRequestBody {
    Desc,
    Flow(FlowStatsRequest),
    Aggregate(FlowStatsRequest),
    Table,
    PortStats { port_no: u32 },
    Queue { port_no: u32, queue_id: u32 },
    Group { group_id: u32 },
    GroupDesc,
    GroupFeatures,
    Meter { meter_id: u32 },
    MeterConfig { meter_id: u32 },
    MeterFeatures,
    TableFeatures(Vec<TableFeatures>),
    PortDesc,
    Experimenter(ExperimenterBody),
}

impl MultipartRequestBody {
    pub fn multipart_type(&self) -> MultipartType {
        match *self {
            MultipartRequestBody::Desc => MultipartType::Desc,
            MultipartRequestBody::Flow(_) => MultipartType::Flow,
            MultipartRequestBody::Aggregate(_) => MultipartType::Aggregate,
            MultipartRequestBody::Table => MultipartType::Table,
            MultipartRequestBody::PortStats { .. } => MultipartType::PortStats,
            MultipartRequestBody::Queue { .. } => MultipartType::Queue,
            MultipartRequestBody::Group { .. } => MultipartType::Group,
            MultipartRequestBody::GroupDesc => MultipartType::GroupDesc,
            MultipartRequestBody::GroupFeatures => MultipartType::GroupFeatures,
            MultipartRequestBody::Meter { .. } => MultipartType::Meter,
            MultipartRequestBody::MeterConfig { .. } => MultipartType::MeterConfig,
            MultipartRequestBody::MeterFeatures => MultipartType::MeterFeatures,
            MultipartRequestBody::TableFeatures(_) => MultipartType::TableFeatures,
            MultipartRequestBody::PortDesc => MultipartType::PortDesc,
            MultipartRequestBody::Experimenter(_) => MultipartType::Experimenter,
        }
    }

    fn size_of(&self) -> usize {
        match *self {
            MultipartRequestBody::Flow(ref req) |
            MultipartRequestBody::Aggregate(ref req) => req.size_of(),
            MultipartRequestBody::PortStats { .. } |
            MultipartRequestBody::Queue { .. } |
            MultipartRequestBody::Group { .. } |
            MultipartRequestBody::Meter { .. } |
            MultipartRequestBody::MeterConfig { .. } => 8,
            MultipartRequestBody::TableFeatures(ref tables) => {
                tables.iter().map(TableFeatures::size_of).sum()
            }
            MultipartRequestBody::Experimenter(ref exp) => exp.size_of(),
            MultipartRequestBody::Desc |
            MultipartRequestBody::Table |
            MultipartRequestBody::GroupDesc |
            MultipartRequestBody::GroupFeatures |
            MultipartRequestBody::MeterFeatures |
            MultipartRequestBody::PortDesc => 0,
        }
    }

    fn parse(typ: MultipartType, bytes: &mut Reader) -> Result<Self, OfpSerializationError> {
        let body = match typ {
            MultipartType::Desc => MultipartRequestBody::Desc,
            MultipartType::Flow => MultipartRequestBody::Flow(FlowStatsRequest::parse(bytes)?),
            MultipartType::Aggregate => {
                MultipartRequestBody::Aggregate(FlowStatsRequest::parse(bytes)?)
            }
            MultipartType::Table => MultipartRequestBody::Table,
            MultipartType::PortStats => {
                let port_no = bytes.read_u32::<BigEndian>()?;
                skip(bytes, 4)?;
                MultipartRequestBody::PortStats { port_no }
            }
            MultipartType::Queue => {
                MultipartRequestBody::Queue {
                    port_no: bytes.read_u32::<BigEndian>()?,
                    queue_id: bytes.read_u32::<BigEndian>()?,
                }
            }
            MultipartType::Group => {
                let group_id = bytes.read_u32::<BigEndian>()?;
                skip(bytes, 4)?;
                MultipartRequestBody::Group { group_id }
            }
            MultipartType::GroupDesc => MultipartRequestBody::GroupDesc,
            MultipartType::GroupFeatures => MultipartRequestBody::GroupFeatures,
            MultipartType::Meter => {
                let meter_id = bytes.read_u32::<BigEndian>()?;
                skip(bytes, 4)?;
                MultipartRequestBody::Meter { meter_id }
            }
            MultipartType::MeterConfig => {
                let meter_id = bytes.read_u32::<BigEndian>()?;
                skip(bytes, 4)?;
                MultipartRequestBody::MeterConfig { meter_id }
            }
            MultipartType::MeterFeatures => MultipartRequestBody::MeterFeatures,
            MultipartType::TableFeatures => {
                MultipartRequestBody::TableFeatures(parse_list(bytes, TableFeatures::parse)?)
            }
            MultipartType::PortDesc => MultipartRequestBody::PortDesc,
            MultipartType::Experimenter => {
                MultipartRequestBody::Experimenter(ExperimenterBody::parse(bytes)?)
            }
        };
        Ok(body)
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        match *self {
            MultipartRequestBody::Flow(ref req) |
            MultipartRequestBody::Aggregate(ref req) => req.marshal(bytes),
            MultipartRequestBody::PortStats { port_no: id } |
            MultipartRequestBody::Group { group_id: id } |
            MultipartRequestBody::Meter { meter_id: id } |
            MultipartRequestBody::MeterConfig { meter_id: id } => {
                bytes.put_u32(id);
                bytes.put_bytes(0, 4);
            }
            MultipartRequestBody::Queue { port_no, queue_id } => {
                bytes.put_u32(port_no);
                bytes.put_u32(queue_id);
            }
            MultipartRequestBody::TableFeatures(ref tables) => {
                for table in tables {
                    table.marshal(bytes);
                }
            }
            MultipartRequestBody::Experimenter(ref exp) => exp.marshal(bytes),
            MultipartRequestBody::Desc |
            MultipartRequestBody::Table |
            MultipartRequestBody::GroupDesc |
            MultipartRequestBody::GroupFeatures |
            MultipartRequestBody::MeterFeatures |
            MultipartRequestBody::PortDesc => (),
        }
    }
}

/// Multipart request (controller -> datapath).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartRequest {
    pub flags: u16,
    pub body: MultipartRequestBody,
}

impl MultipartRequest {
    pub fn new(body: MultipartRequestBody) -> MultipartRequest {
        MultipartRequest { flags: 0, body }
    }
}

impl MessageType for MultipartRequest {
    fn size_of(&self) -> usize {
        8 + self.body.size_of()
    }

    fn parse(buf: &[u8]) -> Result<MultipartRequest, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let code = bytes.read_u16::<BigEndian>()?;
        let flags = bytes.read_u16::<BigEndian>()?;
        skip(&mut bytes, 4)?;
        let typ = MultipartType::of_int(code)
            .ok_or(OfpSerializationError::UnsupportedMultipart { code })?;
        let body = MultipartRequestBody::parse(typ, &mut bytes)?;
        Ok(MultipartRequest { flags, body })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.body.multipart_type() as u16);
        bytes.put_u16(self.flags);
        bytes.put_bytes(0, 4);
        self.body.marshal(bytes);
    }
}

/// Switch description strings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwitchDesc {
    pub mfr_desc: String,
    pub hw_desc: String,
    pub sw_desc: String,
    pub serial_num: String,
    pub dp_desc: String,
}

impl SwitchDesc {
    fn parse(bytes: &mut Reader) -> Result<SwitchDesc, OfpSerializationError> {
        Ok(SwitchDesc {
            mfr_desc: read_string::<256>(bytes)?,
            hw_desc: read_string::<256>(bytes)?,
            sw_desc: read_string::<256>(bytes)?,
            serial_num: read_string::<32>(bytes)?,
            dp_desc: read_string::<256>(bytes)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        put_string(bytes, &self.mfr_desc, 256);
        put_string(bytes, &self.hw_desc, 256);
        put_string(bytes, &self.sw_desc, 256);
        put_string(bytes, &self.serial_num, 32);
        put_string(bytes, &self.dp_desc, 256);
    }
}

/// Statistics for one flow entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowStats {
    pub table_id: u8,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub priority: u16,
    pub idle_timeout: Timeout,
    pub hard_timeout: Timeout,
    pub flags: FlowModFlags,
    pub cookie: u64,
    pub packet_count: u64,
    pub byte_count: u64,
    pub pattern: Pattern,
    pub instructions: Vec<Instruction>,
}

impl FlowStats {
    fn size_of(&self) -> usize {
        48 + self.pattern.size_of() + Instruction::size_of_sequence(&self.instructions)
    }

    fn parse(bytes: &mut Reader) -> Result<FlowStats, OfpSerializationError> {
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "flow stats", length, 48, 2)?;
        let table_id = body.read_u8()?;
        skip(&mut body, 1)?;
        let duration_sec = body.read_u32::<BigEndian>()?;
        let duration_nsec = body.read_u32::<BigEndian>()?;
        let priority = body.read_u16::<BigEndian>()?;
        let idle_timeout = Timeout::of_int(body.read_u16::<BigEndian>()?);
        let hard_timeout = Timeout::of_int(body.read_u16::<BigEndian>()?);
        let flags = FlowModFlags::of_int(body.read_u16::<BigEndian>()?);
        skip(&mut body, 4)?;
        let cookie = body.read_u64::<BigEndian>()?;
        let packet_count = body.read_u64::<BigEndian>()?;
        let byte_count = body.read_u64::<BigEndian>()?;
        let pattern = Pattern::parse(&mut body)?;
        let instructions = Instruction::parse_sequence(&mut body)?;
        Ok(FlowStats {
            table_id,
            duration_sec,
            duration_nsec,
            priority,
            idle_timeout,
            hard_timeout,
            flags,
            cookie,
            packet_count,
            byte_count,
            pattern,
            instructions,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.size_of() as u16);
        bytes.put_u8(self.table_id);
        bytes.put_u8(0);
        bytes.put_u32(self.duration_sec);
        bytes.put_u32(self.duration_nsec);
        bytes.put_u16(self.priority);
        bytes.put_u16(self.idle_timeout.to_int());
        bytes.put_u16(self.hard_timeout.to_int());
        bytes.put_u16(self.flags.to_int());
        bytes.put_bytes(0, 4);
        bytes.put_u64(self.cookie);
        bytes.put_u64(self.packet_count);
        bytes.put_u64(self.byte_count);
        self.pattern.marshal(bytes);
        Instruction::marshal_sequence(&self.instructions, bytes);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub packet_count: u64,
    pub byte_count: u64,
    pub flow_count: u32,
}

impl AggregateStats {
    fn parse(bytes: &mut Reader) -> Result<AggregateStats, OfpSerializationError> {
        let packet_count = bytes.read_u64::<BigEndian>()?;
        let byte_count = bytes.read_u64::<BigEndian>()?;
        let flow_count = bytes.read_u32::<BigEndian>()?;
        skip(bytes, 4)?;
        Ok(AggregateStats {
            packet_count,
            byte_count,
            flow_count,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u64(self.packet_count);
        bytes.put_u64(self.byte_count);
        bytes.put_u32(self.flow_count);
        bytes.put_bytes(0, 4);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TableStats {
    pub table_id: u8,
    pub active_count: u32,
    pub lookup_count: u64,
    pub matched_count: u64,
}

impl TableStats {
    fn parse(bytes: &mut Reader) -> Result<TableStats, OfpSerializationError> {
        let table_id = bytes.read_u8()?;
        skip(bytes, 3)?;
        Ok(TableStats {
            table_id,
            active_count: bytes.read_u32::<BigEndian>()?,
            lookup_count: bytes.read_u64::<BigEndian>()?,
            matched_count: bytes.read_u64::<BigEndian>()?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u8(self.table_id);
        bytes.put_bytes(0, 3);
        bytes.put_u32(self.active_count);
        bytes.put_u64(self.lookup_count);
        bytes.put_u64(self.matched_count);
    }
}

/// Per-port counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PortStats {
    pub port_no: u32,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
}

impl PortStats {
    fn parse(bytes: &mut Reader) -> Result<PortStats, OfpSerializationError> {
        let port_no = bytes.read_u32::<BigEndian>()?;
        skip(bytes, 4)?;
        let mut counters = [0u64; 12];
        for c in counters.iter_mut() {
            *c = bytes.read_u64::<BigEndian>()?;
        }
        let [rx_packets, tx_packets, rx_bytes, tx_bytes, rx_dropped, tx_dropped, rx_errors,
             tx_errors, rx_frame_err, rx_over_err, rx_crc_err, collisions] = counters;
        Ok(PortStats {
            port_no,
            rx_packets,
            tx_packets,
            rx_bytes,
            tx_bytes,
            rx_dropped,
            tx_dropped,
            rx_errors,
            tx_errors,
            rx_frame_err,
            rx_over_err,
            rx_crc_err,
            collisions,
            duration_sec: bytes.read_u32::<BigEndian>()?,
            duration_nsec: bytes.read_u32::<BigEndian>()?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.port_no);
        bytes.put_bytes(0, 4);
        for c in [self.rx_packets, self.tx_packets, self.rx_bytes, self.tx_bytes,
                  self.rx_dropped, self.tx_dropped, self.rx_errors, self.tx_errors,
                  self.rx_frame_err, self.rx_over_err, self.rx_crc_err, self.collisions] {
            bytes.put_u64(c);
        }
        bytes.put_u32(self.duration_sec);
        bytes.put_u32(self.duration_nsec);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub port_no: u32,
    pub queue_id: u32,
    pub tx_bytes: u64,
    pub tx_packets: u64,
    pub tx_errors: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
}

impl QueueStats {
    fn parse(bytes: &mut Reader) -> Result<QueueStats, OfpSerializationError> {
        Ok(QueueStats {
            port_no: bytes.read_u32::<BigEndian>()?,
            queue_id: bytes.read_u32::<BigEndian>()?,
            tx_bytes: bytes.read_u64::<BigEndian>()?,
            tx_packets: bytes.read_u64::<BigEndian>()?,
            tx_errors: bytes.read_u64::<BigEndian>()?,
            duration_sec: bytes.read_u32::<BigEndian>()?,
            duration_nsec: bytes.read_u32::<BigEndian>()?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.port_no);
        bytes.put_u32(self.queue_id);
        bytes.put_u64(self.tx_bytes);
        bytes.put_u64(self.tx_packets);
        bytes.put_u64(self.tx_errors);
        bytes.put_u32(self.duration_sec);
        bytes.put_u32(self.duration_nsec);
    }
}

/// Packet and byte counters, used for group buckets and meter bands.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Counter {
    pub packet_count: u64,
    pub byte_count: u64,
}

impl Counter {
    fn parse(bytes: &mut Reader) -> Result<Counter, OfpSerializationError> {
        Ok(Counter {
            packet_count: bytes.read_u64::<BigEndian>()?,
            byte_count: bytes.read_u64::<BigEndian>()?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u64(self.packet_count);
        bytes.put_u64(self.byte_count);
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupStats {
    pub group_id: u32,
    pub ref_count: u32,
    pub packet_count: u64,
    pub byte_count: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub bucket_stats: Vec<Counter>,
}

impl GroupStats {
    fn size_of(&self) -> usize {
        40 + 16 * self.bucket_stats.len()
    }

    fn parse(bytes: &mut Reader) -> Result<GroupStats, OfpSerializationError> {
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "group stats", length, 40, 2)?;
        skip(&mut body, 2)?;
        let group_id = body.read_u32::<BigEndian>()?;
        let ref_count = body.read_u32::<BigEndian>()?;
        skip(&mut body, 4)?;
        let packet_count = body.read_u64::<BigEndian>()?;
        let byte_count = body.read_u64::<BigEndian>()?;
        let duration_sec = body.read_u32::<BigEndian>()?;
        let duration_nsec = body.read_u32::<BigEndian>()?;
        let bucket_stats = parse_list(&mut body, Counter::parse)?;
        Ok(GroupStats {
            group_id,
            ref_count,
            packet_count,
            byte_count,
            duration_sec,
            duration_nsec,
            bucket_stats,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.size_of() as u16);
        bytes.put_bytes(0, 2);
        bytes.put_u32(self.group_id);
        bytes.put_u32(self.ref_count);
        bytes.put_bytes(0, 4);
        bytes.put_u64(self.packet_count);
        bytes.put_u64(self.byte_count);
        bytes.put_u32(self.duration_sec);
        bytes.put_u32(self.duration_nsec);
        for counter in &self.bucket_stats {
            counter.marshal(bytes);
        }
    }
}

/// A group bucket and its action set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bucket {
    pub weight: u16,
    pub watch_port: u32,
    pub watch_group: u32,
    pub actions: Vec<Action>,
}

impl Bucket {
    fn size_of(&self) -> usize {
        16 + Action::size_of_sequence(&self.actions)
    }

    fn parse(bytes: &mut Reader) -> Result<Bucket, OfpSerializationError> {
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "bucket", length, 16, 2)?;
        let weight = body.read_u16::<BigEndian>()?;
        let watch_port = body.read_u32::<BigEndian>()?;
        let watch_group = body.read_u32::<BigEndian>()?;
        skip(&mut body, 4)?;
        Ok(Bucket {
            weight,
            watch_port,
            watch_group,
            actions: Action::parse_sequence(&mut body)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.size_of() as u16);
        bytes.put_u16(self.weight);
        bytes.put_u32(self.watch_port);
        bytes.put_u32(self.watch_group);
        bytes.put_bytes(0, 4);
        Action::marshal_sequence(&self.actions, bytes);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupDesc {
    /// `OFPGT_*`: all, select, indirect, fast-failover.
    pub group_type: u8,
    pub group_id: u32,
    pub buckets: Vec<Bucket>,
}

impl GroupDesc {
    fn size_of(&self) -> usize {
        8 + self.buckets.iter().map(Bucket::size_of).sum::<usize>()
    }

    fn parse(bytes: &mut Reader) -> Result<GroupDesc, OfpSerializationError> {
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "group desc", length, 8, 2)?;
        let group_type = body.read_u8()?;
        skip(&mut body, 1)?;
        let group_id = body.read_u32::<BigEndian>()?;
        Ok(GroupDesc {
            group_type,
            group_id,
            buckets: parse_list(&mut body, Bucket::parse)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.size_of() as u16);
        bytes.put_u8(self.group_type);
        bytes.put_u8(0);
        bytes.put_u32(self.group_id);
        for bucket in &self.buckets {
            bucket.marshal(bytes);
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GroupFeatures {
    pub types: u32,
    pub capabilities: u32,
    pub max_groups: [u32; 4],
    pub actions: [u32; 4],
}

impl GroupFeatures {
    fn parse(bytes: &mut Reader) -> Result<GroupFeatures, OfpSerializationError> {
        let types = bytes.read_u32::<BigEndian>()?;
        let capabilities = bytes.read_u32::<BigEndian>()?;
        let mut max_groups = [0; 4];
        for g in max_groups.iter_mut() {
            *g = bytes.read_u32::<BigEndian>()?;
        }
        let mut actions = [0; 4];
        for a in actions.iter_mut() {
            *a = bytes.read_u32::<BigEndian>()?;
        }
        Ok(GroupFeatures {
            types,
            capabilities,
            max_groups,
            actions,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.types);
        bytes.put_u32(self.capabilities);
        for g in self.max_groups.iter().chain(self.actions.iter()) {
            bytes.put_u32(*g);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MeterStats {
    pub meter_id: u32,
    pub flow_count: u32,
    pub packet_in_count: u64,
    pub byte_in_count: u64,
    pub duration_sec: u32,
    pub duration_nsec: u32,
    pub band_stats: Vec<Counter>,
}

impl MeterStats {
    fn size_of(&self) -> usize {
        40 + 16 * self.band_stats.len()
    }

    fn parse(bytes: &mut Reader) -> Result<MeterStats, OfpSerializationError> {
        let meter_id = bytes.read_u32::<BigEndian>()?;
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "meter stats", length, 40, 6)?;
        skip(&mut body, 6)?;
        let flow_count = body.read_u32::<BigEndian>()?;
        let packet_in_count = body.read_u64::<BigEndian>()?;
        let byte_in_count = body.read_u64::<BigEndian>()?;
        let duration_sec = body.read_u32::<BigEndian>()?;
        let duration_nsec = body.read_u32::<BigEndian>()?;
        Ok(MeterStats {
            meter_id,
            flow_count,
            packet_in_count,
            byte_in_count,
            duration_sec,
            duration_nsec,
            band_stats: parse_list(&mut body, Counter::parse)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.meter_id);
        bytes.put_u16(self.size_of() as u16);
        bytes.put_bytes(0, 6);
        bytes.put_u32(self.flow_count);
        bytes.put_u64(self.packet_in_count);
        bytes.put_u64(self.byte_in_count);
        bytes.put_u32(self.duration_sec);
        bytes.put_u32(self.duration_nsec);
        for counter in &self.band_stats {
            counter.marshal(bytes);
        }
    }
}

/// A meter band. All standard bands are 16 bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeterBand {
    Drop { rate: u32, burst_size: u32 },
    DscpRemark { rate: u32, burst_size: u32, prec_level: u8 },
    Experimenter { rate: u32, burst_size: u32, experimenter: u32 },
    Unknown { typ: u16, rate: u32, burst_size: u32, body: Vec<u8> },
}

const OFPMBT_DROP: u16 = 1;
const OFPMBT_DSCP_REMARK: u16 = 2;
const OFPMBT_EXPERIMENTER: u16 = 0xffff;

impl MeterBand {
    fn size_of(&self) -> usize {
        match *self {
            MeterBand::Unknown { ref body, .. } => 12 + body.len(),
            _ => 16,
        }
    }

    fn parse(bytes: &mut Reader) -> Result<MeterBand, OfpSerializationError> {
        let typ = bytes.read_u16::<BigEndian>()?;
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "meter band", length, 12, 4)?;
        let rate = body.read_u32::<BigEndian>()?;
        let burst_size = body.read_u32::<BigEndian>()?;
        let band = match typ {
            OFPMBT_DROP if length == 16 => MeterBand::Drop { rate, burst_size },
            OFPMBT_DSCP_REMARK if length == 16 => {
                MeterBand::DscpRemark {
                    rate,
                    burst_size,
                    prec_level: body.read_u8()?,
                }
            }
            OFPMBT_EXPERIMENTER if length == 16 => {
                MeterBand::Experimenter {
                    rate,
                    burst_size,
                    experimenter: body.read_u32::<BigEndian>()?,
                }
            }
            _ => {
                MeterBand::Unknown {
                    typ,
                    rate,
                    burst_size,
                    body: rest(&mut body).to_vec(),
                }
            }
        };
        Ok(band)
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        let (typ, rate, burst_size) = match *self {
            MeterBand::Drop { rate, burst_size } => (OFPMBT_DROP, rate, burst_size),
            MeterBand::DscpRemark { rate, burst_size, .. } => (OFPMBT_DSCP_REMARK, rate, burst_size),
            MeterBand::Experimenter { rate, burst_size, .. } => {
                (OFPMBT_EXPERIMENTER, rate, burst_size)
            }
            MeterBand::Unknown { typ, rate, burst_size, .. } => (typ, rate, burst_size),
        };
        bytes.put_u16(typ);
        bytes.put_u16(self.size_of() as u16);
        bytes.put_u32(rate);
        bytes.put_u32(burst_size);
        match *self {
            MeterBand::Drop { .. } => bytes.put_bytes(0, 4),
            MeterBand::DscpRemark { prec_level, .. } => {
                bytes.put_u8(prec_level);
                bytes.put_bytes(0, 3);
            }
            MeterBand::Experimenter { experimenter, .. } => bytes.put_u32(experimenter),
            MeterBand::Unknown { ref body, .. } => bytes.put_slice(body),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeterConfig {
    pub flags: u16,
    pub meter_id: u32,
    pub bands: Vec<MeterBand>,
}

impl MeterConfig {
    fn size_of(&self) -> usize {
        8 + self.bands.iter().map(MeterBand::size_of).sum::<usize>()
    }

    fn parse(bytes: &mut Reader) -> Result<MeterConfig, OfpSerializationError> {
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "meter config", length, 8, 2)?;
        let flags = body.read_u16::<BigEndian>()?;
        let meter_id = body.read_u32::<BigEndian>()?;
        Ok(MeterConfig {
            flags,
            meter_id,
            bands: parse_list(&mut body, MeterBand::parse)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.size_of() as u16);
        bytes.put_u16(self.flags);
        bytes.put_u32(self.meter_id);
        for band in &self.bands {
            band.marshal(bytes);
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MeterFeatures {
    pub max_meter: u32,
    pub band_types: u32,
    pub capabilities: u32,
    pub max_bands: u8,
    pub max_color: u8,
}

impl MeterFeatures {
    fn parse(bytes: &mut Reader) -> Result<MeterFeatures, OfpSerializationError> {
        let max_meter = bytes.read_u32::<BigEndian>()?;
        let band_types = bytes.read_u32::<BigEndian>()?;
        let capabilities = bytes.read_u32::<BigEndian>()?;
        let max_bands = bytes.read_u8()?;
        let max_color = bytes.read_u8()?;
        skip(bytes, 2)?;
        Ok(MeterFeatures {
            max_meter,
            band_types,
            capabilities,
            max_bands,
            max_color,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u32(self.max_meter);
        bytes.put_u32(self.band_types);
        bytes.put_u32(self.capabilities);
        bytes.put_u8(self.max_bands);
        bytes.put_u8(self.max_color);
        bytes.put_bytes(0, 2);
    }
}

/// A table-feature property, kept as its raw TLV body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableFeatureProp {
    pub typ: u16,
    pub body: Vec<u8>,
}

impl TableFeatureProp {
    fn size_of(&self) -> usize {
        let len = 4 + self.body.len();
        len + pad8(len)
    }

    fn parse(bytes: &mut Reader) -> Result<TableFeatureProp, OfpSerializationError> {
        let typ = bytes.read_u16::<BigEndian>()?;
        let length = bytes.read_u16::<BigEndian>()? as usize;
        check_len("table feature property", length, 4, remaining(bytes) + 4)?;
        let body = take(bytes, length - 4)?.to_vec();
        skip(bytes, pad8(length))?;
        Ok(TableFeatureProp { typ, body })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        let len = 4 + self.body.len();
        bytes.put_u16(self.typ);
        bytes.put_u16(len as u16);
        bytes.put_slice(&self.body);
        bytes.put_bytes(0, pad8(len));
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableFeatures {
    pub table_id: u8,
    pub name: String,
    pub metadata_match: u64,
    pub metadata_write: u64,
    pub config: u32,
    pub max_entries: u32,
    pub properties: Vec<TableFeatureProp>,
}

impl TableFeatures {
    fn size_of(&self) -> usize {
        64 + self.properties.iter().map(TableFeatureProp::size_of).sum::<usize>()
    }

    fn parse(bytes: &mut Reader) -> Result<TableFeatures, OfpSerializationError> {
        let length = bytes.read_u16::<BigEndian>()? as usize;
        let mut body = record(bytes, "table features", length, 64, 2)?;
        let table_id = body.read_u8()?;
        skip(&mut body, 5)?;
        let name = read_string::<32>(&mut body)?;
        let metadata_match = body.read_u64::<BigEndian>()?;
        let metadata_write = body.read_u64::<BigEndian>()?;
        let config = body.read_u32::<BigEndian>()?;
        let max_entries = body.read_u32::<BigEndian>()?;
        Ok(TableFeatures {
            table_id,
            name,
            metadata_match,
            metadata_write,
            config,
            max_entries,
            properties: parse_list(&mut body, TableFeatureProp::parse)?,
        })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.size_of() as u16);
        bytes.put_u8(self.table_id);
        bytes.put_bytes(0, 5);
        put_string(bytes, &self.name, 32);
        bytes.put_u64(self.metadata_match);
        bytes.put_u64(self.metadata_write);
        bytes.put_u32(self.config);
        bytes.put_u32(self.max_entries);
        for prop in &self.properties {
            prop.marshal(bytes);
        }
    }
}

/// Multipart reply bodies, one shape per multipart type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MultipartReplyBody {
    Desc(SwitchDesc),
    Flow(Vec<FlowStats>),
    Aggregate(AggregateStats),
    Table(Vec<TableStats>),
    PortStats(Vec<PortStats>),
    Queue(Vec<QueueStats>),
    Group(Vec<GroupStats>),
    GroupDesc(Vec<GroupDesc>),
    GroupFeatures(GroupFeatures),
    Meter(Vec<MeterStats>),
    MeterConfig(Vec<MeterConfig>),
    MeterFeatures(MeterFeatures),
    TableFeatures(Vec<TableFeatures>),
    PortDesc(Vec<PortDesc>),
    Experimenter(ExperimenterBody),
}

impl MultipartReplyBody {
    pub fn multipart_type(&self) -> MultipartType {
        match *self {
            MultipartReplyBody::Desc(_) => MultipartType::Desc,
            MultipartReplyBody::Flow(_) => MultipartType::Flow,
            MultipartReplyBody::Aggregate(_) => MultipartType::Aggregate,
            MultipartReplyBody::Table(_) => MultipartType::Table,
            MultipartReplyBody::PortStats(_) => MultipartType::PortStats,
            MultipartReplyBody::Queue(_) => MultipartType::Queue,
            MultipartReplyBody::Group(_) => MultipartType::Group,
            MultipartReplyBody::GroupDesc(_) => MultipartType::GroupDesc,
            MultipartReplyBody::GroupFeatures(_) => MultipartType::GroupFeatures,
            MultipartReplyBody::Meter(_) => MultipartType::Meter,
            MultipartReplyBody::MeterConfig(_) => MultipartType::MeterConfig,
            MultipartReplyBody::MeterFeatures(_) => MultipartType::MeterFeatures,
            MultipartReplyBody::TableFeatures(_) => MultipartType::TableFeatures,
            MultipartReplyBody::PortDesc(_) => MultipartType::PortDesc,
            MultipartReplyBody::Experimenter(_) => MultipartType::Experimenter,
        }
    }

    fn size_of(&self) -> usize {
        match *self {
            MultipartReplyBody::Desc(_) => 1056,
            MultipartReplyBody::Flow(ref v) => v.iter().map(FlowStats::size_of).sum(),
            MultipartReplyBody::Aggregate(_) => 24,
            MultipartReplyBody::Table(ref v) => 24 * v.len(),
            MultipartReplyBody::PortStats(ref v) => 112 * v.len(),
            MultipartReplyBody::Queue(ref v) => 40 * v.len(),
            MultipartReplyBody::Group(ref v) => v.iter().map(GroupStats::size_of).sum(),
            MultipartReplyBody::GroupDesc(ref v) => v.iter().map(GroupDesc::size_of).sum(),
            MultipartReplyBody::GroupFeatures(_) => 40,
            MultipartReplyBody::Meter(ref v) => v.iter().map(MeterStats::size_of).sum(),
            MultipartReplyBody::MeterConfig(ref v) => v.iter().map(MeterConfig::size_of).sum(),
            MultipartReplyBody::MeterFeatures(_) => 16,
            MultipartReplyBody::TableFeatures(ref v) => v.iter().map(TableFeatures::size_of).sum(),
            MultipartReplyBody::PortDesc(ref v) => v.iter().map(PortDesc::size_of).sum(),
            MultipartReplyBody::Experimenter(ref exp) => exp.size_of(),
        }
    }

    fn parse(typ: MultipartType, bytes: &mut Reader) -> Result<Self, OfpSerializationError> {
        let body = match typ {
            MultipartType::Desc => MultipartReplyBody::Desc(SwitchDesc::parse(bytes)?),
            MultipartType::Flow => MultipartReplyBody::Flow(parse_list(bytes, FlowStats::parse)?),
            MultipartType::Aggregate => {
                MultipartReplyBody::Aggregate(AggregateStats::parse(bytes)?)
            }
            MultipartType::Table => MultipartReplyBody::Table(parse_list(bytes, TableStats::parse)?),
            MultipartType::PortStats => {
                MultipartReplyBody::PortStats(parse_list(bytes, PortStats::parse)?)
            }
            MultipartType::Queue => MultipartReplyBody::Queue(parse_list(bytes, QueueStats::parse)?),
            MultipartType::Group => MultipartReplyBody::Group(parse_list(bytes, GroupStats::parse)?),
            MultipartType::GroupDesc => {
                MultipartReplyBody::GroupDesc(parse_list(bytes, GroupDesc::parse)?)
            }
            MultipartType::GroupFeatures => {
                MultipartReplyBody::GroupFeatures(GroupFeatures::parse(bytes)?)
            }
            MultipartType::Meter => MultipartReplyBody::Meter(parse_list(bytes, MeterStats::parse)?),
            MultipartType::MeterConfig => {
                MultipartReplyBody::MeterConfig(parse_list(bytes, MeterConfig::parse)?)
            }
            MultipartType::MeterFeatures => {
                MultipartReplyBody::MeterFeatures(MeterFeatures::parse(bytes)?)
            }
            MultipartType::TableFeatures => {
                MultipartReplyBody::TableFeatures(parse_list(bytes, TableFeatures::parse)?)
            }
            MultipartType::PortDesc => {
                MultipartReplyBody::PortDesc(parse_list(bytes, PortDesc::parse)?)
            }
            MultipartType::Experimenter => {
                MultipartReplyBody::Experimenter(ExperimenterBody::parse(bytes)?)
            }
        };
        Ok(body)
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        match *self {
            MultipartReplyBody::Desc(ref desc) => desc.marshal(bytes),
            MultipartReplyBody::Flow(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::Aggregate(ref agg) => agg.marshal(bytes),
            MultipartReplyBody::Table(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::PortStats(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::Queue(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::Group(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::GroupDesc(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::GroupFeatures(ref f) => f.marshal(bytes),
            MultipartReplyBody::Meter(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::MeterConfig(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::MeterFeatures(ref f) => f.marshal(bytes),
            MultipartReplyBody::TableFeatures(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::PortDesc(ref v) => v.iter().for_each(|s| s.marshal(bytes)),
            MultipartReplyBody::Experimenter(ref exp) => exp.marshal(bytes),
        }
    }
}

/// Multipart reply (datapath -> controller).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MultipartReply {
    pub flags: u16,
    pub body: MultipartReplyBody,
}

impl MultipartReply {
    /// Whether further replies for the same request follow.
    pub fn more(&self) -> bool {
        test_bit(0, self.flags as u64)
    }
}

impl MessageType for MultipartReply {
    fn size_of(&self) -> usize {
        8 + self.body.size_of()
    }

    fn parse(buf: &[u8]) -> Result<MultipartReply, OfpSerializationError> {
        let mut bytes = Cursor::new(buf);
        let code = bytes.read_u16::<BigEndian>()?;
        let flags = bytes.read_u16::<BigEndian>()?;
        skip(&mut bytes, 4)?;
        let typ = MultipartType::of_int(code)
            .ok_or(OfpSerializationError::UnsupportedMultipart { code })?;
        let body = MultipartReplyBody::parse(typ, &mut bytes)?;
        Ok(MultipartReply { flags, body })
    }

    fn marshal(&self, bytes: &mut Vec<u8>) {
        bytes.put_u16(self.body.multipart_type() as u16);
        bytes.put_u16(self.flags);
        bytes.put_bytes(0, 4);
        self.body.marshal(bytes);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::openflow0x04::features::tests::port_desc;
    use crate::openflow0x04::oxm::OxmField;

    fn assert_round_trip(reply: MultipartReply) {
        let mut bytes = vec![];
        reply.marshal(&mut bytes);
        assert_eq!(bytes.len(), reply.size_of(), "{:?}", reply.body.multipart_type());
        let parsed = MultipartReply::parse(&bytes).unwrap();
        assert_eq!(parsed, reply);
        let mut again = vec![];
        parsed.marshal(&mut again);
        assert_eq!(again, bytes);
    }

    pub(crate) fn flow_stats(priority: u16, packets: u64) -> FlowStats {
        FlowStats {
            table_id: 0,
            duration_sec: 10,
            duration_nsec: 500,
            priority,
            idle_timeout: Timeout::Permanent,
            hard_timeout: Timeout::ExpiresAfter(300),
            flags: FlowModFlags::default(),
            cookie: 0x1,
            packet_count: packets,
            byte_count: packets * 64,
            pattern: Pattern::match_all().with(OxmField::InPort(1)),
            instructions: vec![Instruction::ApplyActions(vec![Action::output(PseudoPort::PhysicalPort(2))])],
        }
    }

    #[test]
    fn flow_stats_reply_wire_sample() {
        let wire = [
            0x00, 0x01, 0x00, 0x00, 0, 0, 0, 0, // type flow, flags
            0x00, 0x38, // length 56
            0x00, 0x00, // table 0, pad
            0, 0, 0, 5, 0, 0, 0, 0, // duration
            0x80, 0x00, 0x00, 0x00, 0x00, 0x00, // priority, idle, hard
            0x00, 0x00, 0, 0, 0, 0, // flags, pad
            0, 0, 0, 0, 0, 0, 0, 0, // cookie
            0, 0, 0, 0, 0, 0, 0, 3, // packets
            0, 0, 0, 0, 0, 0, 0, 180, // bytes
            0x00, 0x01, 0x00, 0x04, 0, 0, 0, 0, // empty match
        ];
        let reply = MultipartReply::parse(&wire).unwrap();
        match reply.body {
            MultipartReplyBody::Flow(ref stats) => {
                assert_eq!(stats.len(), 1);
                assert_eq!(stats[0].priority, 0x8000);
                assert_eq!(stats[0].packet_count, 3);
                assert!(stats[0].instructions.is_empty());
            }
            ref other => panic!("unexpected body {:?}", other),
        }
        let mut bytes = vec![];
        reply.marshal(&mut bytes);
        assert_eq!(bytes, wire);
    }

    #[test]
    fn every_reply_type_round_trips() {
        let bodies = vec![
            MultipartReplyBody::Desc(SwitchDesc {
                mfr_desc: "Nicira, Inc.".to_string(),
                hw_desc: "Open vSwitch".to_string(),
                sw_desc: "2.17.0".to_string(),
                serial_num: "None".to_string(),
                dp_desc: "s1".to_string(),
            }),
            MultipartReplyBody::Flow(vec![flow_stats(1, 2), flow_stats(0, 0)]),
            MultipartReplyBody::Aggregate(AggregateStats {
                packet_count: 4,
                byte_count: 400,
                flow_count: 2,
            }),
            MultipartReplyBody::Table(vec![TableStats {
                                               table_id: 0,
                                               active_count: 3,
                                               lookup_count: 90,
                                               matched_count: 80,
                                           }]),
            MultipartReplyBody::PortStats(vec![PortStats { port_no: 1, rx_packets: 7, ..PortStats::default() },
                                               PortStats { port_no: 2, collisions: 1, ..PortStats::default() }]),
            MultipartReplyBody::Queue(vec![QueueStats { port_no: 1, queue_id: 0, tx_bytes: 5, ..QueueStats::default() }]),
            MultipartReplyBody::Group(vec![GroupStats {
                                               group_id: 1,
                                               ref_count: 2,
                                               bucket_stats: vec![Counter { packet_count: 1, byte_count: 60 }],
                                               ..GroupStats::default()
                                           }]),
            MultipartReplyBody::GroupDesc(vec![GroupDesc {
                                                   group_type: 1,
                                                   group_id: 4,
                                                   buckets: vec![Bucket {
                                                                     weight: 1,
                                                                     watch_port: 0xffffffff,
                                                                     watch_group: 0xffffffff,
                                                                     actions: vec![Action::output(PseudoPort::PhysicalPort(3))],
                                                                 }],
                                               }]),
            MultipartReplyBody::GroupFeatures(GroupFeatures {
                types: 0xf,
                capabilities: 0x3,
                max_groups: [16, 16, 16, 16],
                actions: [1, 1, 1, 1],
            }),
            MultipartReplyBody::Meter(vec![MeterStats {
                                               meter_id: 1,
                                               flow_count: 1,
                                               band_stats: vec![Counter::default()],
                                               ..MeterStats::default()
                                           }]),
            MultipartReplyBody::MeterConfig(vec![MeterConfig {
                                                     flags: 1,
                                                     meter_id: 1,
                                                     bands: vec![MeterBand::Drop { rate: 1000, burst_size: 0 },
                                                                 MeterBand::DscpRemark {
                                                                     rate: 500,
                                                                     burst_size: 10,
                                                                     prec_level: 1,
                                                                 }],
                                                 }]),
            MultipartReplyBody::MeterFeatures(MeterFeatures {
                max_meter: 64,
                band_types: 3,
                capabilities: 0xf,
                max_bands: 4,
                max_color: 0,
            }),
            MultipartReplyBody::TableFeatures(vec![TableFeatures {
                                                       table_id: 0,
                                                       name: "classifier".to_string(),
                                                       metadata_match: u64::MAX,
                                                       metadata_write: u64::MAX,
                                                       config: 0,
                                                       max_entries: 1_000_000,
                                                       properties: vec![TableFeatureProp {
                                                                            typ: 2,
                                                                            body: vec![0x00, 0x01],
                                                                        }],
                                                   }]),
            MultipartReplyBody::PortDesc(vec![port_desc(1), port_desc(2)]),
            MultipartReplyBody::Experimenter(ExperimenterBody {
                experimenter: 0x2320,
                exp_type: 1,
                data: vec![9, 9],
            }),
        ];
        for body in bodies {
            assert_round_trip(MultipartReply { flags: 0, body });
        }
    }

    #[test]
    fn more_flag() {
        let reply = MultipartReply {
            flags: 1,
            body: MultipartReplyBody::Table(vec![]),
        };
        assert!(reply.more());
    }

    #[test]
    fn unknown_multipart_type_is_unsupported() {
        let wire = [0x00, 0x20, 0x00, 0x00, 0, 0, 0, 0];
        assert!(matches!(MultipartReply::parse(&wire),
                         Err(OfpSerializationError::UnsupportedMultipart { code: 0x20 })));
        assert!(matches!(MultipartRequest::parse(&wire),
                         Err(OfpSerializationError::UnsupportedMultipart { code: 0x20 })));
    }

    #[test]
    fn request_bodies_round_trip() {
        let requests = vec![
            MultipartRequestBody::Desc,
            MultipartRequestBody::Flow(FlowStatsRequest::all()),
            MultipartRequestBody::Aggregate(FlowStatsRequest::all()),
            MultipartRequestBody::PortStats { port_no: 0xffffffff },
            MultipartRequestBody::Queue { port_no: 1, queue_id: 0xffffffff },
            MultipartRequestBody::Group { group_id: 0xfffffffc },
            MultipartRequestBody::Meter { meter_id: 0xffffffff },
            MultipartRequestBody::MeterConfig { meter_id: 1 },
            MultipartRequestBody::TableFeatures(vec![]),
            MultipartRequestBody::PortDesc,
        ];
        for body in requests {
            let req = MultipartRequest::new(body);
            let mut bytes = vec![];
            req.marshal(&mut bytes);
            assert_eq!(bytes.len(), req.size_of());
            assert_eq!(MultipartRequest::parse(&bytes).unwrap(), req);
        }
    }

    #[test]
    fn truncated_flow_stats_record_is_rejected() {
        let mut bytes = vec![];
        MultipartReply {
                flags: 0,
                body: MultipartReplyBody::Flow(vec![flow_stats(1, 1)]),
            }
            .marshal(&mut bytes);
        bytes.truncate(bytes.len() - 4);
        assert!(MultipartReply::parse(&bytes).is_err());
    }
}
