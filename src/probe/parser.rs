use crate::probe::ProbeResponse;
use crate::utils::packet_utils::IcmpDatagram;

/// Decides whether a received datagram answers a given probe.
///
/// `None` means "not ours": the caller keeps listening within its timeout.
pub trait ProbeResponseParser: Send + Sync {
    fn parse(&self, datagram: &IcmpDatagram) -> Option<ProbeResponse>;
}

fn probe_response(datagram: &IcmpDatagram, sequence_number: u16) -> ProbeResponse {
    ProbeResponse::new(
        datagram.source(),
        datagram.ttl(),
        datagram.total_length(),
        sequence_number,
        datagram.header().icmp_type,
    )
}

/// Ping: only echo replies carrying our identifier and sequence number.
pub struct EchoReplyParser {
    identifier: u16,
    sequence_number: u16,
}

impl EchoReplyParser {
    pub fn new(identifier: u16, sequence_number: u16) -> Self {
        Self {
            identifier,
            sequence_number,
        }
    }
}

impl ProbeResponseParser for EchoReplyParser {
    fn parse(&self, datagram: &IcmpDatagram) -> Option<ProbeResponse> {
        let header = datagram.header();
        if !header.is_echo_reply() {
            return None;
        }

        if header.identifier != self.identifier || header.sequence_number != self.sequence_number {
            return None;
        }

        Some(probe_response(datagram, header.sequence_number))
    }
}

/// Traceroute over ICMP: the destination's echo reply, or an error message
/// from a router quoting our echo request.
pub struct IcmpProbeResponseParser {
    identifier: u16,
    sequence_number: u16,
}

impl IcmpProbeResponseParser {
    pub fn new(identifier: u16, sequence_number: u16) -> Self {
        Self {
            identifier,
            sequence_number,
        }
    }

    fn is_ours(&self, identifier: u16, sequence_number: u16) -> bool {
        identifier == self.identifier && sequence_number == self.sequence_number
    }
}

impl ProbeResponseParser for IcmpProbeResponseParser {
    fn parse(&self, datagram: &IcmpDatagram) -> Option<ProbeResponse> {
        let header = datagram.header();
        if header.is_echo_reply() {
            if !self.is_ours(header.identifier, header.sequence_number) {
                return None;
            }
        } else if header.is_error() {
            let echo_request = datagram.quoted_icmp_header()?;
            if !self.is_ours(echo_request.identifier, echo_request.sequence_number) {
                return None;
            }
        } else {
            return None;
        }

        Some(probe_response(datagram, self.sequence_number))
    }
}

/// Traceroute over UDP: error messages quoting a datagram sent to our port.
pub struct UdpProbeResponseParser {
    destination_port: u16,
}

impl UdpProbeResponseParser {
    pub fn new(destination_port: u16) -> Self {
        Self { destination_port }
    }
}

impl ProbeResponseParser for UdpProbeResponseParser {
    fn parse(&self, datagram: &IcmpDatagram) -> Option<ProbeResponse> {
        if !datagram.header().is_error() {
            return None;
        }

        if datagram.quoted_udp_destination_port()? != self.destination_port {
            return None;
        }

        Some(probe_response(datagram, self.destination_port))
    }
}
