//! Decoding of the Ethernet frames carried in packet-in payloads.
use std::io::{self, Cursor};

use byteorder::{BigEndian, ReadBytesExt};
use thiserror::Error;

use crate::bits::test_bit;
use crate::openflow0x04::oxm::MacAddr;

/// An Ethernet frame too short to carry its own headers.
#[derive(Debug, Error)]
#[error("truncated ethernet frame: {0}")]
pub struct PacketError(#[from] io::Error);

type Reader<'a> = Cursor<&'a [u8]>;

fn read_mac(bytes: &mut Reader) -> io::Result<MacAddr> {
    let mut mac = [0; 6];
    for b in mac.iter_mut() {
        *b = bytes.read_u8()?;
    }
    Ok(mac)
}

fn rest<'a>(bytes: &Reader<'a>) -> &'a [u8] {
    let buf: &'a [u8] = *bytes.get_ref();
    &buf[(bytes.position() as usize).min(buf.len())..]
}

pub fn is_broadcast(mac: &MacAddr) -> bool {
    mac.iter().all(|b| *b == 0xff)
}

/// Group addresses have the low bit of the first octet set.
pub fn is_multicast(mac: &MacAddr) -> bool {
    test_bit(0, mac[0] as u64)
}

/// TCP header flags.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub ns: bool,
    pub cwr: bool,
    pub ece: bool,
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,
}

impl TcpFlags {
    fn of_int(d: u16) -> TcpFlags {
        let d = d as u64;
        TcpFlags {
            ns: test_bit(8, d),
            cwr: test_bit(7, d),
            ece: test_bit(6, d),
            urg: test_bit(5, d),
            ack: test_bit(4, d),
            psh: test_bit(3, d),
            rst: test_bit(2, d),
            syn: test_bit(1, d),
            fin: test_bit(0, d),
        }
    }
}

/// TCP segment header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tcp {
    pub src: u16,
    pub dst: u16,
    pub seq: u32,
    pub ack: u32,
    pub offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
}

impl Tcp {
    fn parse(bytes: &mut Reader) -> io::Result<Tcp> {
        let src = bytes.read_u16::<BigEndian>()?;
        let dst = bytes.read_u16::<BigEndian>()?;
        let seq = bytes.read_u32::<BigEndian>()?;
        let ack = bytes.read_u32::<BigEndian>()?;
        let offset_and_flags = bytes.read_u16::<BigEndian>()?;
        let window = bytes.read_u16::<BigEndian>()?;
        Ok(Tcp {
            src,
            dst,
            seq,
            ack,
            offset: (offset_and_flags >> 12) as u8,
            flags: TcpFlags::of_int(offset_and_flags & 0x1ff),
            window,
        })
    }
}

/// Represents packets at the transport protocol level, which are encapsulated
/// within the IPv4 payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tp {
    Tcp(Tcp),
    Udp { src: u16, dst: u16 },
    Icmp { typ: u8, code: u8 },
    Unparsable(u8, Vec<u8>),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Flags {
    pub dont_fragment: bool,
    pub more_fragments: bool,
}

fn parse_ports(bytes: &mut Reader) -> io::Result<(u16, u16)> {
    Ok((bytes.read_u16::<BigEndian>()?, bytes.read_u16::<BigEndian>()?))
}

fn parse_icmp(bytes: &mut Reader) -> io::Result<(u8, u8)> {
    Ok((bytes.read_u8()?, bytes.read_u8()?))
}

/// IPv4 header of a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ip {
    pub tos: u8,
    pub ident: u16,
    pub flags: Flags,
    pub frag: u16,
    pub ttl: u8,
    pub proto: u8,
    pub src: u32,
    pub dst: u32,
    pub tp: Tp,
}

const IP_PROTO_ICMP: u8 = 0x01;
const IP_PROTO_TCP: u8 = 0x06;
const IP_PROTO_UDP: u8 = 0x11;

impl Ip {
    fn parse(bytes: &mut Reader) -> io::Result<Option<Ip>> {
        let vhl = bytes.read_u8()?;
        if (vhl >> 4) != 4 {
            return Ok(None);
        }
        let ihl = (vhl & 0x0f) as usize * 4;
        if ihl < 20 {
            return Ok(None);
        }
        let tos = bytes.read_u8()?;
        let _total_len = bytes.read_u16::<BigEndian>()?;
        let ident = bytes.read_u16::<BigEndian>()?;
        let frag = bytes.read_u16::<BigEndian>()?;
        let ttl = bytes.read_u8()?;
        let proto = bytes.read_u8()?;
        let _chksum = bytes.read_u16::<BigEndian>()?;
        let src = bytes.read_u32::<BigEndian>()?;
        let dst = bytes.read_u32::<BigEndian>()?;
        bytes.set_position(bytes.position() + (ihl - 20) as u64);
        let payload = rest(bytes);
        let mut tp_bytes = Cursor::new(payload);
        let tp = match proto {
            IP_PROTO_TCP => Tcp::parse(&mut tp_bytes).map(Tp::Tcp),
            IP_PROTO_UDP => parse_ports(&mut tp_bytes).map(|(src, dst)| Tp::Udp { src, dst }),
            IP_PROTO_ICMP => {
                parse_icmp(&mut tp_bytes).map(|(typ, code)| Tp::Icmp { typ, code })
            }
            _ => Ok(Tp::Unparsable(proto, payload.to_vec())),
        };
        Ok(Some(Ip {
            tos,
            ident,
            flags: Flags {
                dont_fragment: test_bit(14, frag as u64),
                more_fragments: test_bit(13, frag as u64),
            },
            frag: frag & 0x1fff,
            ttl,
            proto,
            src,
            dst,
            tp: tp.unwrap_or_else(|_| Tp::Unparsable(proto, payload.to_vec())),
        }))
    }
}

/// Address resolution protocol (ARP) packet payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Arp {
    Query { sha: MacAddr, spa: u32, tpa: u32 },
    Reply { sha: MacAddr, spa: u32, tha: MacAddr, tpa: u32 },
}

impl Arp {
    fn parse(bytes: &mut Reader) -> io::Result<Option<Arp>> {
        bytes.set_position(bytes.position() + 6);
        let oper = bytes.read_u16::<BigEndian>()?;
        let sha = read_mac(bytes)?;
        let spa = bytes.read_u32::<BigEndian>()?;
        let tha = read_mac(bytes)?;
        let tpa = bytes.read_u32::<BigEndian>()?;
        let arp = match oper {
            0x0001 => Some(Arp::Query { sha, spa, tpa }),
            0x0002 => Some(Arp::Reply { sha, spa, tha, tpa }),
            _ => None,
        };
        Ok(arp)
    }
}

/// Represents a packet at the network protocol level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Nw {
    Ip(Ip),
    Arp(Arp),
    Unparsable(u16, Vec<u8>),
}

/// Represents a packet at the ethernet protocol level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub dl_vlan: Option<u16>,
    pub dl_vlan_dei: bool,
    pub dl_vlan_pcp: u8,
    pub dl_typ: u16,
    pub nw: Nw,
}

pub const ETH_TYP_IP: u16 = 0x0800;
pub const ETH_TYP_ARP: u16 = 0x0806;
const ETH_TYP_VLAN: u16 = 0x8100;

impl Packet {
    /// Decode an Ethernet frame. Only the Ethernet header is mandatory; network headers that
    /// fail to decode are kept as `Nw::Unparsable`.
    pub fn parse(buf: &[u8]) -> Result<Packet, PacketError> {
        let mut bytes = Cursor::new(buf);
        let dl_dst = read_mac(&mut bytes)?;
        let dl_src = read_mac(&mut bytes)?;
        let typ = bytes.read_u16::<BigEndian>()?;
        let (dl_vlan, dl_vlan_dei, dl_vlan_pcp, dl_typ) = if typ == ETH_TYP_VLAN {
            let tci = bytes.read_u16::<BigEndian>()?;
            let typ = bytes.read_u16::<BigEndian>()?;
            (Some(tci & 0xfff), tci & 0x1000 != 0, (tci >> 13) as u8, typ)
        } else {
            (None, false, 0, typ)
        };
        let payload = rest(&bytes);
        let mut nw_bytes = Cursor::new(payload);
        let nw = match dl_typ {
            ETH_TYP_IP => Ip::parse(&mut nw_bytes).ok().flatten().map(Nw::Ip),
            ETH_TYP_ARP => Arp::parse(&mut nw_bytes).ok().flatten().map(Nw::Arp),
            _ => None,
        };
        Ok(Packet {
            dl_src,
            dl_dst,
            dl_vlan,
            dl_vlan_dei,
            dl_vlan_pcp,
            dl_typ,
            nw: nw.unwrap_or_else(|| Nw::Unparsable(dl_typ, payload.to_vec())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(dst: MacAddr, src: MacAddr, typ: u16, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![];
        frame.extend_from_slice(&dst);
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&typ.to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn arp_query() {
        let mut arp = vec![0, 1, 8, 0, 6, 4, 0, 1];
        arp.extend_from_slice(&[0, 0, 0, 0, 0, 1]);
        arp.extend_from_slice(&[10, 0, 0, 1]);
        arp.extend_from_slice(&[0; 6]);
        arp.extend_from_slice(&[10, 0, 0, 2]);
        let frame = eth([0xff; 6], [0, 0, 0, 0, 0, 1], ETH_TYP_ARP, &arp);
        let pkt = Packet::parse(&frame).unwrap();
        assert!(is_broadcast(&pkt.dl_dst));
        assert_eq!(pkt.nw,
                   Nw::Arp(Arp::Query {
                       sha: [0, 0, 0, 0, 0, 1],
                       spa: 0x0a000001,
                       tpa: 0x0a000002,
                   }));
    }

    #[test]
    fn vlan_tagged_ipv4_udp() {
        let mut ip = vec![0x45, 0, 0, 28, 0, 1, 0x40, 0, 64, IP_PROTO_UDP, 0, 0];
        ip.extend_from_slice(&[10, 0, 0, 1, 10, 0, 0, 2]);
        ip.extend_from_slice(&[0x30, 0x39, 0x00, 0x35, 0, 8, 0, 0]);
        let mut tagged = vec![0x20, 0x0a];
        tagged.extend_from_slice(&ETH_TYP_IP.to_be_bytes());
        tagged.extend_from_slice(&ip);
        let frame = eth([0, 0, 0, 0, 0, 2], [0, 0, 0, 0, 0, 1], ETH_TYP_VLAN, &tagged);
        let pkt = Packet::parse(&frame).unwrap();
        assert_eq!(pkt.dl_vlan, Some(10));
        assert_eq!(pkt.dl_vlan_pcp, 1);
        assert_eq!(pkt.dl_typ, ETH_TYP_IP);
        match pkt.nw {
            Nw::Ip(ref ip) => {
                assert!(ip.flags.dont_fragment);
                assert_eq!(ip.tp, Tp::Udp { src: 12345, dst: 53 });
            }
            ref other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn short_network_header_is_unparsable() {
        let frame = eth([0, 0, 0, 0, 0, 2], [0, 0, 0, 0, 0, 1], ETH_TYP_IP, &[0x45, 0]);
        let pkt = Packet::parse(&frame).unwrap();
        assert_eq!(pkt.nw, Nw::Unparsable(ETH_TYP_IP, vec![0x45, 0]));
    }

    #[test]
    fn truncated_ethernet_header_is_an_error() {
        assert!(Packet::parse(&[0xff; 10]).is_err());
    }

    #[test]
    fn multicast_bit() {
        assert!(is_multicast(&[0x01, 0x00, 0x5e, 0, 0, 1]));
        assert!(!is_multicast(&[0x00, 0x00, 0x5e, 0, 0, 1]));
    }
}
