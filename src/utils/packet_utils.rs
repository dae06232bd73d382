use std::net::Ipv4Addr;

use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::udp::UdpPacket;

use crate::utils::bytes::ToBytes;
use crate::utils::checksum::internet_checksum;

pub const ICMP_ECHO_REPLY: u8 = 0;
pub const ICMP_DESTINATION_UNREACHABLE: u8 = 3;
pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_TIME_EXCEEDED: u8 = 11;

/// Received datagrams are assumed to carry no IP options.
pub const IPV4_HEADER_LENGTH: usize = 20;
pub const ICMP_HEADER_LENGTH: usize = 8;
pub const MIN_DATAGRAM_LENGTH: usize = IPV4_HEADER_LENGTH + ICMP_HEADER_LENGTH;

/// The 8-byte header shared by ICMP echo request, echo reply and the error
/// messages (for which identifier/sequence number are the unused field).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub identifier: u16,
    pub sequence_number: u16,
}

impl IcmpHeader {
    pub fn echo_request(identifier: u16, sequence_number: u16) -> Self {
        let mut echo_request = Self {
            icmp_type: ICMP_ECHO_REQUEST,
            code: 0,
            checksum: 0,
            identifier,
            sequence_number,
        };
        echo_request.checksum = internet_checksum(&echo_request.to_bytes());
        echo_request
    }

    /// The error messages share the echo layout in their first 8 bytes.
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let echo_packet = EchoReplyPacket::new(data)?;
        Some(Self {
            icmp_type: echo_packet.get_icmp_type().0,
            code: echo_packet.get_icmp_code().0,
            checksum: echo_packet.get_checksum(),
            identifier: echo_packet.get_identifier(),
            sequence_number: echo_packet.get_sequence_number(),
        })
    }

    pub fn is_echo_reply(&self) -> bool {
        self.icmp_type == ICMP_ECHO_REPLY && self.code == 0
    }

    pub fn is_ttl_expired(&self) -> bool {
        self.icmp_type == ICMP_TIME_EXCEEDED && self.code == 0
    }

    pub fn is_destination_unreachable(&self) -> bool {
        self.icmp_type == ICMP_DESTINATION_UNREACHABLE
    }

    pub fn is_error(&self) -> bool {
        self.is_ttl_expired() || self.is_destination_unreachable()
    }
}

/// A raw datagram as delivered by a raw ICMP socket: IPv4 header followed by ICMP.
#[derive(Clone, Debug)]
pub struct IcmpDatagram {
    source: Ipv4Addr,
    ttl: u8,
    total_length: usize,
    header: IcmpHeader,
    body: Vec<u8>,
}

impl IcmpDatagram {
    /// Returns `None` for anything shorter than an IPv4 header plus an ICMP header.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_DATAGRAM_LENGTH {
            return None;
        }

        let ipv4_packet = Ipv4Packet::new(data)?;
        let header = IcmpHeader::from_bytes(&data[IPV4_HEADER_LENGTH..])?;

        Some(Self {
            source: ipv4_packet.get_source(),
            ttl: ipv4_packet.get_ttl(),
            total_length: data.len(),
            header,
            body: data[MIN_DATAGRAM_LENGTH..].to_vec(),
        })
    }

    pub fn source(&self) -> Ipv4Addr {
        self.source
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn total_length(&self) -> usize {
        self.total_length
    }

    pub fn header(&self) -> &IcmpHeader {
        &self.header
    }

    /// ICMP header of the echo request quoted by a time-exceeded/unreachable message.
    pub fn quoted_icmp_header(&self) -> Option<IcmpHeader> {
        IcmpHeader::from_bytes(self.quoted_transport_header()?)
    }

    /// Destination port of the UDP datagram quoted by a time-exceeded/unreachable message.
    pub fn quoted_udp_destination_port(&self) -> Option<u16> {
        let udp_packet = UdpPacket::new(self.quoted_transport_header()?)?;
        Some(udp_packet.get_destination())
    }

    fn quoted_transport_header(&self) -> Option<&[u8]> {
        if !self.header.is_error() {
            return None;
        }

        let quoted_ipv4_packet = Ipv4Packet::new(&self.body)?;
        let quoted_header_length = quoted_ipv4_packet.get_header_length() as usize * 4;
        if quoted_header_length < IPV4_HEADER_LENGTH {
            return None;
        }

        self.body.get(quoted_header_length..)
    }
}
