use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::select;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::probe::{CompletableProbe, ProbeError, ProbeResponse, ProbeResponseParser, ProbeResult};
use crate::probe::parser::{EchoReplyParser, IcmpProbeResponseParser, UdpProbeResponseParser};
use crate::socket::ProbeSocket;
use crate::utils::bytes::ToBytes;
use crate::utils::packet_utils::{IcmpDatagram, IcmpHeader};

/// One probe attempt: `Idle -> Sent -> {Replied | TimedOut}`.
#[async_trait]
pub trait ProbeTask: Send {
    /// Sends the probe with the given TTL (`None` keeps the system default)
    /// and waits at most `timeout` for a matching response.
    async fn send_probe(
        &mut self,
        ttl: Option<u8>,
        timeout: Duration,
    ) -> Result<ProbeResult, ProbeError>;

    fn sequence_number(&self) -> u16;
}

const RECV_BUFFER_SIZE: usize = 1024;

// Raw ICMP sockets ignore the port.
const ICMP_PORT: u16 = 0;

/// Waits for a datagram accepted by `parser`, discarding everything else,
/// until `timeout` elapses.
async fn wait_probe_response(
    socket: &dyn ProbeSocket,
    parser: &dyn ProbeResponseParser,
    completable_probe: CompletableProbe,
    sequence_number: u16,
    timeout: Duration,
) -> Result<ProbeResult, ProbeError> {
    let timer = sleep(timeout);

    select! {
        _ = timer => {
            debug!(sequence_number, "probe timed out");
            Ok(ProbeResult::Timeout { sequence_number })
        },
        probe_response = recv_probe_response(socket, parser) => {
            let probe_response = probe_response.map_err(ProbeError::Receive)?;
            Ok(ProbeResult::Reply(completable_probe.complete(probe_response)))
        },
    }
}

async fn recv_probe_response(
    socket: &dyn ProbeSocket,
    parser: &dyn ProbeResponseParser,
) -> std::io::Result<ProbeResponse> {
    let mut buffer = [0u8; RECV_BUFFER_SIZE];
    loop {
        let size = socket.recv(&mut buffer).await?;

        let datagram = match IcmpDatagram::parse(&buffer[..size]) {
            Some(datagram) => datagram,
            None => {
                trace!(size, "discarding malformed datagram");
                continue;
            }
        };

        match parser.parse(&datagram) {
            Some(probe_response) => return Ok(probe_response),
            None => debug!(
                from = %datagram.source(),
                icmp_type = datagram.header().icmp_type,
                identifier = datagram.header().identifier,
                "discarding unrelated ICMP datagram"
            ),
        }
    }
}

async fn send_datagram(
    socket: &dyn ProbeSocket,
    bytes: &[u8],
    socket_addr: SocketAddr,
    ttl: Option<u8>,
) -> Result<(), ProbeError> {
    if let Some(hop_limit) = ttl {
        socket
            .set_ttl(hop_limit as u32)
            .map_err(|source| ProbeError::Send { ttl, source })?;
    }

    socket
        .send_to(bytes, socket_addr)
        .await
        .map_err(|source| ProbeError::Send { ttl, source })?;

    Ok(())
}

/// Ping probe: a single raw ICMP socket sends the echo request and receives the reply.
pub struct EchoProbeTask {
    socket: Box<dyn ProbeSocket>,
    destination_address: Ipv4Addr,
    identifier: u16,
    sequence_number: u16,
}

impl EchoProbeTask {
    pub fn new(
        socket: Box<dyn ProbeSocket>,
        destination_address: Ipv4Addr,
        identifier: u16,
        sequence_number: u16,
    ) -> Self {
        Self {
            socket,
            destination_address,
            identifier,
            sequence_number,
        }
    }
}

#[async_trait]
impl ProbeTask for EchoProbeTask {
    async fn send_probe(
        &mut self,
        ttl: Option<u8>,
        timeout: Duration,
    ) -> Result<ProbeResult, ProbeError> {
        let echo_request = IcmpHeader::echo_request(self.identifier, self.sequence_number);
        let socket_addr = SocketAddr::new(IpAddr::V4(self.destination_address), ICMP_PORT);

        let completable_probe = CompletableProbe::new();
        send_datagram(self.socket.as_ref(), &echo_request.to_bytes(), socket_addr, ttl).await?;
        debug!(destination = %self.destination_address, identifier = self.identifier,
            sequence_number = self.sequence_number, "echo request sent");

        let parser = EchoReplyParser::new(self.identifier, self.sequence_number);
        wait_probe_response(self.socket.as_ref(), &parser, completable_probe, self.sequence_number, timeout).await
    }

    fn sequence_number(&self) -> u16 {
        self.sequence_number
    }
}

/// Traceroute probe over ICMP: the echo request leaves with a limited TTL and
/// a second raw socket listens for the echo reply or time-exceeded message.
pub struct IcmpProbeTask {
    send_socket: Box<dyn ProbeSocket>,
    recv_socket: Box<dyn ProbeSocket>,
    destination_address: Ipv4Addr,
    icmp_id: u16,
    icmp_sqn: u16,
}

impl IcmpProbeTask {
    pub fn new(
        send_socket: Box<dyn ProbeSocket>,
        recv_socket: Box<dyn ProbeSocket>,
        destination_address: Ipv4Addr,
        icmp_id: u16,
        icmp_sqn: u16,
    ) -> Self {
        Self {
            send_socket,
            recv_socket,
            destination_address,
            icmp_id,
            icmp_sqn,
        }
    }
}

#[async_trait]
impl ProbeTask for IcmpProbeTask {
    async fn send_probe(
        &mut self,
        ttl: Option<u8>,
        timeout: Duration,
    ) -> Result<ProbeResult, ProbeError> {
        let echo_request = IcmpHeader::echo_request(self.icmp_id, self.icmp_sqn);
        let socket_addr = SocketAddr::new(IpAddr::V4(self.destination_address), ICMP_PORT);

        let completable_probe = CompletableProbe::new();
        send_datagram(self.send_socket.as_ref(), &echo_request.to_bytes(), socket_addr, ttl).await?;
        debug!(destination = %self.destination_address, ?ttl, sequence_number = self.icmp_sqn, "ICMP probe sent");

        let parser = IcmpProbeResponseParser::new(self.icmp_id, self.icmp_sqn);
        wait_probe_response(self.recv_socket.as_ref(), &parser, completable_probe, self.icmp_sqn, timeout).await
    }

    fn sequence_number(&self) -> u16 {
        self.icmp_sqn
    }
}

/// Traceroute probe over UDP: an empty datagram to an unused port, answered by
/// an ICMP error caught on a raw ICMP socket.
///
/// Whether the kernel hands ICMP errors for a UDP socket to an unconnected raw
/// socket is platform dependent; Linux does.
pub struct UdpProbeTask {
    send_socket: Box<dyn ProbeSocket>,
    recv_socket: Box<dyn ProbeSocket>,
    destination_address: Ipv4Addr,
    destination_port: u16,
}

impl UdpProbeTask {
    pub fn new(
        send_socket: Box<dyn ProbeSocket>,
        recv_socket: Box<dyn ProbeSocket>,
        destination_address: Ipv4Addr,
        destination_port: u16,
    ) -> Self {
        Self {
            send_socket,
            recv_socket,
            destination_address,
            destination_port,
        }
    }
}

#[async_trait]
impl ProbeTask for UdpProbeTask {
    async fn send_probe(
        &mut self,
        ttl: Option<u8>,
        timeout: Duration,
    ) -> Result<ProbeResult, ProbeError> {
        let socket_addr = SocketAddr::new(IpAddr::V4(self.destination_address), self.destination_port);

        let completable_probe = CompletableProbe::new();
        send_datagram(self.send_socket.as_ref(), &[], socket_addr, ttl).await?;
        debug!(destination = %socket_addr, ?ttl, "UDP probe sent");

        let parser = UdpProbeResponseParser::new(self.destination_port);
        wait_probe_response(self.recv_socket.as_ref(), &parser, completable_probe, self.destination_port, timeout).await
    }

    fn sequence_number(&self) -> u16 {
        self.destination_port
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use crate::socket::SocketFactory;
    use crate::testing::{self, SimulatedNetwork};

    use super::*;

    const DESTINATION: Ipv4Addr = Ipv4Addr::new(192, 0, 2, 1);
    const TIMEOUT: Duration = Duration::from_secs(2);

    fn echo_task(network: &SimulatedNetwork, identifier: u16, sequence_number: u16) -> EchoProbeTask {
        EchoProbeTask::new(network.icmp_socket().unwrap(), DESTINATION, identifier, sequence_number)
    }

    #[tokio::test(start_paused = true)]
    async fn echo_probe_replies_with_matching_identifier() {
        let network = SimulatedNetwork::new(|sent| {
            let request = sent.echo_request().unwrap();
            vec![testing::echo_reply(DESTINATION, 51, request.identifier, request.sequence_number)]
        });

        let result = echo_task(&network, 7, 0).send_probe(None, TIMEOUT).await.unwrap();
        let reply = result.reply().unwrap();
        assert_eq!(reply.from_address(), DESTINATION);
        assert_eq!(reply.ttl(), 51);
        assert_eq!(reply.packet_size(), 28);
        assert_eq!(reply.sequence_number(), 0);
        assert_eq!(network.sent().len(), 1);
        assert_eq!(network.sent()[0].bytes, vec![0x08, 0x00, 0xf7, 0xf8, 0x00, 0x07, 0x00, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_identifier_does_not_end_the_probe() {
        let network = SimulatedNetwork::new(|sent| {
            let request = sent.echo_request().unwrap();
            vec![
                testing::echo_reply(DESTINATION, 64, request.identifier.wrapping_add(1), request.sequence_number),
                testing::echo_reply(DESTINATION, 50, request.identifier, request.sequence_number),
            ]
        });

        let result = echo_task(&network, 300, 4).send_probe(None, TIMEOUT).await.unwrap();
        let reply = result.reply().unwrap();
        assert_eq!(reply.ttl(), 50);
        assert_eq!(reply.sequence_number(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn only_mismatched_replies_time_out() {
        let network = SimulatedNetwork::new(|sent| {
            let request = sent.echo_request().unwrap();
            vec![testing::echo_reply(DESTINATION, 64, request.identifier ^ 0xffff, request.sequence_number)]
        });

        let result = echo_task(&network, 1, 9).send_probe(None, TIMEOUT).await.unwrap();
        assert_eq!(result, ProbeResult::Timeout { sequence_number: 9 });
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_datagrams_are_skipped() {
        let network = SimulatedNetwork::new(|sent| {
            let request = sent.echo_request().unwrap();
            vec![
                vec![0x45, 0x00, 0x00],
                testing::echo_reply(DESTINATION, 50, request.identifier, request.sequence_number),
            ]
        });

        let result = echo_task(&network, 1, 1).send_probe(None, TIMEOUT).await.unwrap();
        assert!(result.reply().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn silence_times_out() {
        let network = SimulatedNetwork::new(|_| Vec::new());
        let started = tokio::time::Instant::now();

        let result = echo_task(&network, 1, 2).send_probe(None, TIMEOUT).await.unwrap();
        assert!(result.is_timeout());
        assert!(started.elapsed() >= TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn icmp_probe_sets_ttl_and_listens_on_second_socket() {
        let router = Ipv4Addr::new(10, 1, 1, 1);
        let network = SimulatedNetwork::new(move |sent| {
            let request = sent.echo_request().unwrap();
            let quoted = testing::quoted_echo_request(DESTINATION, request.identifier, request.sequence_number);
            vec![testing::time_exceeded(router, &quoted)]
        });

        let mut task = IcmpProbeTask::new(
            network.icmp_socket().unwrap(),
            network.icmp_socket().unwrap(),
            DESTINATION,
            77,
            5,
        );
        let result = task.send_probe(Some(3), TIMEOUT).await.unwrap();
        assert_eq!(result.reply().unwrap().from_address(), router);
        assert_eq!(network.sent()[0].ttl, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn udp_probe_sends_empty_datagram_to_port() {
        let network = SimulatedNetwork::new(|sent| {
            let quoted = testing::quoted_udp(DESTINATION, sent.destination.port());
            vec![testing::port_unreachable(DESTINATION, &quoted)]
        });

        let mut task = UdpProbeTask::new(
            network.udp_socket().unwrap(),
            network.icmp_socket().unwrap(),
            DESTINATION,
            33440,
        );
        let result = task.send_probe(Some(12), TIMEOUT).await.unwrap();
        assert_eq!(result.reply().unwrap().from_address(), DESTINATION);

        let sent = &network.sent()[0];
        assert!(sent.bytes.is_empty());
        assert_eq!(sent.destination.port(), 33440);
        assert_eq!(sent.ttl, Some(12));
    }
}
