//! IPv4 datagram construction with TCP, UDP or opaque payloads.

use std::net::Ipv4Addr;

use crate::{Result, TrafficError};

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

pub const IPV4_HEADER_LEN: usize = 20;
pub const TCP_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

pub const DEFAULT_TTL: u8 = 64;

/// TCP SYN flag bit.
pub const TCP_SYN: u8 = 0x02;

const MAX_DATAGRAM: usize = u16::MAX as usize;

/// Builds complete IPv4 datagrams between a fixed pair of hosts.
#[derive(Debug, Clone)]
pub struct PacketBuilder {
    source: Ipv4Addr,
    destination: Ipv4Addr,
    identification: u16,
}

impl PacketBuilder {
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Self { source, destination, identification: 1 }
    }

    pub fn source(&self) -> Ipv4Addr {
        self.source
    }

    pub fn destination(&self) -> Ipv4Addr {
        self.destination
    }

    /// TCP segment with the given flags carrying `payload`.
    pub fn tcp(
        &mut self,
        source_port: u16,
        destination_port: u16,
        sequence: u32,
        flags: u8,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let mut segment = vec![0u8; TCP_HEADER_LEN];
        segment[0..2].copy_from_slice(&source_port.to_be_bytes());
        segment[2..4].copy_from_slice(&destination_port.to_be_bytes());
        segment[4..8].copy_from_slice(&sequence.to_be_bytes());
        // Data offset: 5 words, no options
        segment[12] = 0x50;
        segment[13] = flags;
        segment[14..16].copy_from_slice(&8192u16.to_be_bytes());
        segment.extend_from_slice(payload);

        let checksum = transport_checksum(self.source, self.destination, IPPROTO_TCP, &segment);
        segment[16..18].copy_from_slice(&checksum.to_be_bytes());

        self.datagram(IPPROTO_TCP, &segment)
    }

    /// UDP datagram carrying `payload`. The checksum is left at zero, which
    /// IPv4 receivers treat as "not computed".
    pub fn udp(
        &mut self,
        source_port: u16,
        destination_port: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        let udp_len = UDP_HEADER_LEN + payload.len();
        let length = u16::try_from(udp_len).map_err(|_| oversized(udp_len))?;

        let mut datagram = Vec::with_capacity(udp_len);
        datagram.extend_from_slice(&source_port.to_be_bytes());
        datagram.extend_from_slice(&destination_port.to_be_bytes());
        datagram.extend_from_slice(&length.to_be_bytes());
        datagram.extend_from_slice(&[0, 0]);
        datagram.extend_from_slice(payload);

        self.datagram(IPPROTO_UDP, &datagram)
    }

    /// Datagram carrying `payload` directly over IP with protocol number `protocol`.
    pub fn raw(&mut self, protocol: u8, payload: &[u8]) -> Result<Vec<u8>> {
        self.datagram(protocol, payload)
    }

    fn datagram(&mut self, protocol: u8, body: &[u8]) -> Result<Vec<u8>> {
        let total_len = IPV4_HEADER_LEN + body.len();
        if total_len > MAX_DATAGRAM {
            return Err(oversized(total_len));
        }

        let mut packet = Vec::with_capacity(total_len);
        packet.push(0x45); // version 4, IHL 5
        packet.push(0x00);
        packet.extend_from_slice(&(total_len as u16).to_be_bytes());
        packet.extend_from_slice(&self.identification.to_be_bytes());
        packet.extend_from_slice(&[0x40, 0x00]); // don't fragment
        packet.push(DEFAULT_TTL);
        packet.push(protocol);
        packet.extend_from_slice(&[0, 0]);
        packet.extend_from_slice(&self.source.octets());
        packet.extend_from_slice(&self.destination.octets());

        let checksum = internet_checksum(&packet);
        packet[10..12].copy_from_slice(&checksum.to_be_bytes());
        packet.extend_from_slice(body);

        self.identification = self.identification.wrapping_add(1);
        Ok(packet)
    }
}

fn oversized(len: usize) -> TrafficError {
    TrafficError::transmission(format!("packet of {len} bytes exceeds the IPv4 size limit"))
}

/// RFC 1071 ones' complement checksum.
pub fn internet_checksum(data: &[u8]) -> u16 {
    !fold(sum_words(data, 0))
}

fn sum_words(data: &[u8], initial: u32) -> u32 {
    let mut chunks = data.chunks_exact(2);
    let mut sum = chunks
        .by_ref()
        .fold(initial, |acc, w| acc.wrapping_add(u32::from(u16::from_be_bytes([w[0], w[1]]))));
    if let [last] = chunks.remainder() {
        sum = sum.wrapping_add(u32::from(*last) << 8);
    }
    sum
}

fn fold(mut sum: u32) -> u16 {
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum as u16
}

/// Checksum over the IPv4 pseudo-header followed by `segment`.
pub fn transport_checksum(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    protocol: u8,
    segment: &[u8],
) -> u16 {
    let mut pseudo = [0u8; 12];
    pseudo[0..4].copy_from_slice(&source.octets());
    pseudo[4..8].copy_from_slice(&destination.octets());
    pseudo[9] = protocol;
    pseudo[10..12].copy_from_slice(&(segment.len() as u16).to_be_bytes());

    !fold(sum_words(segment, sum_words(&pseudo, 0)))
}
