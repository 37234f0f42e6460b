//! Link-layer, IPv4, TCP and UDP header parsing for captured frames.

use std::net::Ipv4Addr;

use crate::codec::ipv4::{IPPROTO_TCP, IPPROTO_UDP};

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const AF_INET_BSD: u32 = 2;

/// Framing in front of the IPv4 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// 14-byte Ethernet II header, optionally one 802.1Q tag
    Ethernet,
    /// Bare IPv4 datagram (raw sockets, `DLT_RAW`)
    RawIp,
    /// 16-byte Linux cooked capture header (`any` device)
    LinuxSll,
    /// 4-byte BSD loopback family header in host byte order
    Null,
    /// 4-byte OpenBSD loopback family header in network byte order
    Loop,
}

impl LinkType {
    /// Map a libpcap `DLT_*` / `LINKTYPE_*` value.
    pub fn from_dlt(value: i32) -> Option<Self> {
        match value {
            0 => Some(LinkType::Null),
            1 => Some(LinkType::Ethernet),
            12 | 14 | 101 => Some(LinkType::RawIp),
            108 => Some(LinkType::Loop),
            113 => Some(LinkType::LinuxSll),
            _ => None,
        }
    }
}

/// Transport view of an IPv4 datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport<'a> {
    Tcp { source_port: u16, destination_port: u16, flags: u8, payload: &'a [u8] },
    Udp { source_port: u16, destination_port: u16, payload: &'a [u8] },
    /// Any other protocol number; the payload follows the IPv4 header.
    Other { payload: &'a [u8] },
}

/// Parsed IPv4 datagram borrowing from the captured bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datagram<'a> {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    pub transport: Transport<'a>,
}

impl<'a> Datagram<'a> {
    pub fn destination_port(&self) -> Option<u16> {
        match self.transport {
            Transport::Tcp { destination_port, .. } | Transport::Udp { destination_port, .. } => {
                Some(destination_port)
            }
            Transport::Other { .. } => None,
        }
    }

    /// Application bytes after the transport header.
    pub fn payload(&self) -> &'a [u8] {
        match self.transport {
            Transport::Tcp { payload, .. }
            | Transport::Udp { payload, .. }
            | Transport::Other { payload } => payload,
        }
    }
}

/// Parse a captured frame. Returns `None` for anything that is not a
/// complete, unfragmented IPv4 datagram.
pub fn parse_frame(link: LinkType, data: &[u8]) -> Option<Datagram<'_>> {
    let ip = match link {
        LinkType::RawIp => data,
        LinkType::Ethernet => {
            let mut ethertype = u16::from_be_bytes([*data.get(12)?, *data.get(13)?]);
            let mut offset = 14;
            if ethertype == ETHERTYPE_VLAN {
                ethertype = u16::from_be_bytes([*data.get(16)?, *data.get(17)?]);
                offset = 18;
            }
            if ethertype != ETHERTYPE_IPV4 {
                return None;
            }
            data.get(offset..)?
        }
        LinkType::LinuxSll => {
            if u16::from_be_bytes([*data.get(14)?, *data.get(15)?]) != ETHERTYPE_IPV4 {
                return None;
            }
            data.get(16..)?
        }
        LinkType::Null | LinkType::Loop => {
            let family: [u8; 4] = data.get(0..4)?.try_into().ok()?;
            let family = match link {
                LinkType::Loop => u32::from_be_bytes(family),
                _ => u32::from_ne_bytes(family),
            };
            if family != AF_INET_BSD {
                return None;
            }
            data.get(4..)?
        }
    };
    parse_ipv4(ip)
}

/// Parse a bare IPv4 datagram.
pub fn parse_ipv4(data: &[u8]) -> Option<Datagram<'_>> {
    let version_ihl = *data.first()?;
    if version_ihl >> 4 != 4 {
        return None;
    }
    let header_len = usize::from(version_ihl & 0x0F) * 4;
    let total_len = usize::from(u16::from_be_bytes([*data.get(2)?, *data.get(3)?]));
    if header_len < 20 || total_len < header_len || data.len() < header_len {
        return None;
    }

    // Fragmented datagrams are not reassembled.
    let flags_offset = u16::from_be_bytes([data[6], data[7]]);
    if flags_offset & 0x3FFF != 0 {
        return None;
    }

    // Captures may carry link padding past total_len, or be truncated by snaplen.
    let end = total_len.min(data.len());
    let body = &data[header_len..end];
    let protocol = data[9];
    let source = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let destination = Ipv4Addr::new(data[16], data[17], data[18], data[19]);

    let transport = match protocol {
        IPPROTO_TCP => parse_tcp(body)?,
        IPPROTO_UDP => parse_udp(body)?,
        _ => Transport::Other { payload: body },
    };

    Some(Datagram { source, destination, protocol, transport })
}

fn parse_tcp(segment: &[u8]) -> Option<Transport<'_>> {
    let data_offset = usize::from(*segment.get(12)? >> 4) * 4;
    if data_offset < 20 || segment.len() < data_offset {
        return None;
    }
    Some(Transport::Tcp {
        source_port: u16::from_be_bytes([segment[0], segment[1]]),
        destination_port: u16::from_be_bytes([segment[2], segment[3]]),
        flags: segment[13],
        payload: &segment[data_offset..],
    })
}

fn parse_udp(datagram: &[u8]) -> Option<Transport<'_>> {
    if datagram.len() < 8 {
        return None;
    }
    let length = usize::from(u16::from_be_bytes([datagram[4], datagram[5]]));
    let end = if (8..=datagram.len()).contains(&length) { length } else { datagram.len() };
    Some(Transport::Udp {
        source_port: u16::from_be_bytes([datagram[0], datagram[1]]),
        destination_port: u16::from_be_bytes([datagram[2], datagram[3]]),
        payload: &datagram[8..end],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ipv4::{PacketBuilder, TCP_SYN};
    use crate::test_utils::{ethernet_frame, linux_sll_frame};

    fn builder() -> PacketBuilder {
        PacketBuilder::new(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2))
    }

    #[test]
    fn parses_udp_over_ethernet() {
        let packet = builder().udp(5000, 12345, b"1.5").unwrap();
        let frame = ethernet_frame(&packet);
        let datagram = parse_frame(LinkType::Ethernet, &frame).unwrap();

        assert_eq!(datagram.source, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(datagram.destination, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(
            datagram.transport,
            Transport::Udp { source_port: 5000, destination_port: 12345, payload: b"1.5" }
        );
    }

    #[test]
    fn parses_tcp_over_linux_cooked_capture() {
        let packet = builder().tcp(5000, 80, 1, TCP_SYN, b"GET").unwrap();
        let frame = linux_sll_frame(&packet);
        let datagram = parse_frame(LinkType::LinuxSll, &frame).unwrap();

        assert_eq!(datagram.protocol, IPPROTO_TCP);
        assert_eq!(datagram.destination_port(), Some(80));
        assert_eq!(datagram.payload(), b"GET");
    }

    #[test]
    fn custom_protocol_payload_follows_ip_header() {
        let packet = builder().raw(253, &[0, 0, 0, 1]).unwrap();
        let datagram = parse_frame(LinkType::RawIp, &packet).unwrap();
        assert_eq!(datagram.protocol, 253);
        assert_eq!(datagram.destination_port(), None);
        assert_eq!(datagram.payload(), &[0, 0, 0, 1]);
    }

    #[test]
    fn ethernet_padding_is_ignored() {
        let packet = builder().udp(1, 2, b"7").unwrap();
        let mut frame = ethernet_frame(&packet);
        frame.extend_from_slice(&[0u8; 20]);
        let datagram = parse_frame(LinkType::Ethernet, &frame).unwrap();
        assert_eq!(datagram.payload(), b"7");
    }

    #[test]
    fn null_loopback_header_uses_host_order() {
        let packet = builder().udp(1, 2, b"x").unwrap();
        let mut frame = AF_INET_BSD.to_ne_bytes().to_vec();
        frame.extend_from_slice(&packet);
        assert!(parse_frame(LinkType::Null, &frame).is_some());

        let mut frame = AF_INET_BSD.to_be_bytes().to_vec();
        frame.extend_from_slice(&packet);
        assert!(parse_frame(LinkType::Loop, &frame).is_some());
    }

    #[test]
    fn rejects_non_ipv4_and_truncated_frames() {
        let packet = builder().udp(1, 2, b"x").unwrap();
        let mut frame = ethernet_frame(&packet);
        frame[12] = 0x86;
        frame[13] = 0xDD;
        assert!(parse_frame(LinkType::Ethernet, &frame).is_none());

        assert!(parse_ipv4(&packet[..10]).is_none());
        assert!(parse_ipv4(&[]).is_none());
        assert!(parse_frame(LinkType::Ethernet, &[0u8; 6]).is_none());
    }

    #[test]
    fn later_fragments_are_skipped() {
        let mut packet = builder().udp(1, 2, b"x").unwrap();
        packet[6] = 0x20; // more fragments
        assert!(parse_ipv4(&packet).is_none());
    }

    #[test]
    fn dlt_values_map_to_link_types() {
        assert_eq!(LinkType::from_dlt(1), Some(LinkType::Ethernet));
        assert_eq!(LinkType::from_dlt(113), Some(LinkType::LinuxSll));
        assert_eq!(LinkType::from_dlt(101), Some(LinkType::RawIp));
        assert_eq!(LinkType::from_dlt(127), None);
    }
}
