//! A simulated network for exercising probes without raw sockets.

use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

use crate::socket::{ProbeSocket, SocketFactory};
use crate::utils::bytes::ToBytes;
use crate::utils::checksum::internet_checksum;
use crate::utils::packet_utils::{
    IcmpHeader, ICMP_DESTINATION_UNREACHABLE, ICMP_ECHO_REPLY, ICMP_TIME_EXCEEDED,
};

#[derive(Clone, Debug)]
pub struct SentDatagram {
    pub bytes: Vec<u8>,
    pub destination: SocketAddr,
    pub ttl: Option<u8>,
}

impl SentDatagram {
    pub fn echo_request(&self) -> Option<IcmpHeader> {
        IcmpHeader::from_bytes(&self.bytes)
    }
}

type Responder = dyn Fn(&SentDatagram) -> Vec<Vec<u8>> + Send + Sync;
type Inbox = Mutex<VecDeque<Vec<u8>>>;

/// Every datagram sent through one of its sockets is handed to `responder`;
/// the datagrams it returns are delivered to every socket open at that moment,
/// the way a raw ICMP socket sees all ICMP traffic.
#[derive(Clone)]
pub struct SimulatedNetwork {
    responder: Arc<Responder>,
    sent: Arc<Mutex<Vec<SentDatagram>>>,
    inboxes: Arc<Mutex<Vec<Weak<Inbox>>>>,
    failing_sends: Arc<Vec<usize>>,
    send_attempts: Arc<AtomicUsize>,
}

impl SimulatedNetwork {
    pub fn new(responder: impl Fn(&SentDatagram) -> Vec<Vec<u8>> + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            sent: Arc::new(Mutex::new(Vec::new())),
            inboxes: Arc::new(Mutex::new(Vec::new())),
            failing_sends: Arc::new(Vec::new()),
            send_attempts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The listed send attempts (0-based, across all sockets) fail and reach
    /// nobody.
    pub fn with_failing_sends(mut self, attempts: Vec<usize>) -> Self {
        self.failing_sends = Arc::new(attempts);
        self
    }

    /// A path of routers ending at the destination. Routers listed in
    /// `silent_ttls` never answer.
    pub fn path(hops: Vec<Ipv4Addr>, silent_ttls: Vec<u8>) -> Self {
        Self::new(move |sent| {
            let ttl = sent.ttl.unwrap_or(64);
            if silent_ttls.contains(&ttl) || hops.is_empty() {
                return Vec::new();
            }

            let destination = *hops.last().unwrap_or(&Ipv4Addr::UNSPECIFIED);
            let quoted = match sent.echo_request() {
                Some(echo_request) if sent.destination.port() == 0 => {
                    quoted_echo_request(destination, echo_request.identifier, echo_request.sequence_number)
                }
                _ => quoted_udp(destination, sent.destination.port()),
            };

            let hop_index = ttl as usize - 1;
            if hop_index + 1 < hops.len() {
                return vec![time_exceeded(hops[hop_index], &quoted)];
            }

            match sent.echo_request() {
                Some(echo_request) if sent.destination.port() == 0 => vec![echo_reply(
                    destination,
                    64 - hops.len() as u8,
                    echo_request.identifier,
                    echo_request.sequence_number,
                )],
                _ => vec![port_unreachable(destination, &quoted)],
            }
        })
    }

    pub fn sent(&self) -> Vec<SentDatagram> {
        self.sent.lock().unwrap().clone()
    }

    fn open_socket(&self) -> Box<dyn ProbeSocket> {
        let inbox = Arc::new(Mutex::new(VecDeque::new()));
        self.inboxes.lock().unwrap().push(Arc::downgrade(&inbox));
        Box::new(SimulatedSocket {
            network: self.clone(),
            inbox,
            ttl: Mutex::new(None),
        })
    }

    fn deliver(&self, sent: SentDatagram) {
        let responses = (self.responder)(&sent);
        self.sent.lock().unwrap().push(sent);

        let mut inboxes = self.inboxes.lock().unwrap();
        inboxes.retain(|inbox| inbox.strong_count() > 0);
        for inbox in inboxes.iter().filter_map(Weak::upgrade) {
            inbox.lock().unwrap().extend(responses.iter().cloned());
        }
    }
}

impl SocketFactory for SimulatedNetwork {
    fn icmp_socket(&self) -> io::Result<Box<dyn ProbeSocket>> {
        Ok(self.open_socket())
    }

    fn udp_socket(&self) -> io::Result<Box<dyn ProbeSocket>> {
        Ok(self.open_socket())
    }
}

/// A network where no raw socket can be opened.
pub struct UnprivilegedNetwork;

impl SocketFactory for UnprivilegedNetwork {
    fn icmp_socket(&self) -> io::Result<Box<dyn ProbeSocket>> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }

    fn udp_socket(&self) -> io::Result<Box<dyn ProbeSocket>> {
        Err(io::Error::from(io::ErrorKind::PermissionDenied))
    }
}

struct SimulatedSocket {
    network: SimulatedNetwork,
    inbox: Arc<Inbox>,
    ttl: Mutex<Option<u8>>,
}

#[async_trait]
impl ProbeSocket for SimulatedSocket {
    async fn send_to(&self, buf: &[u8], socket_addr: SocketAddr) -> io::Result<usize> {
        let attempt = self.network.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.network.failing_sends.contains(&attempt) {
            return Err(io::Error::new(io::ErrorKind::Other, "no route to host"));
        }

        let ttl = *self.ttl.lock().unwrap();
        self.network.deliver(SentDatagram {
            bytes: buf.to_vec(),
            destination: socket_addr,
            ttl,
        });
        Ok(buf.len())
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let datagram = self.inbox.lock().unwrap().pop_front();
        match datagram {
            Some(datagram) => {
                let size = datagram.len().min(buf.len());
                buf[..size].copy_from_slice(&datagram[..size]);
                Ok(size)
            }
            None => futures::future::pending().await,
        }
    }

    fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        *self.ttl.lock().unwrap() = Some(ttl as u8);
        Ok(())
    }
}

/// A 20-byte IPv4 header (no options, protocol ICMP) followed by `payload`.
pub fn ipv4_datagram(source: Ipv4Addr, ttl: u8, payload: &[u8]) -> Vec<u8> {
    ipv4_datagram_with_protocol(source, Ipv4Addr::new(198, 51, 100, 1), ttl, 1, payload)
}

fn ipv4_datagram_with_protocol(
    source: Ipv4Addr,
    destination: Ipv4Addr,
    ttl: u8,
    protocol: u8,
    payload: &[u8],
) -> Vec<u8> {
    let total_length = (20 + payload.len()) as u16;
    let mut bytes = Vec::with_capacity(total_length as usize);
    bytes.extend_from_slice(&[0x45, 0x00]);
    bytes.extend_from_slice(&total_length.to_be_bytes());
    bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
    bytes.extend_from_slice(&[ttl, protocol, 0x00, 0x00]);
    bytes.extend_from_slice(&source.octets());
    bytes.extend_from_slice(&destination.octets());
    let checksum = internet_checksum(&bytes);
    bytes[10..12].copy_from_slice(&checksum.to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes
}

pub fn echo_request_bytes(identifier: u16, sequence_number: u16) -> Vec<u8> {
    IcmpHeader::echo_request(identifier, sequence_number).to_bytes()
}

pub fn echo_reply(source: Ipv4Addr, ttl: u8, identifier: u16, sequence_number: u16) -> Vec<u8> {
    let header = icmp_message(ICMP_ECHO_REPLY, 0, identifier, sequence_number, &[]);
    ipv4_datagram(source, ttl, &header)
}

/// The original IPv4 header plus the first 8 bytes of an echo request, as
/// quoted by ICMP error messages.
pub fn quoted_echo_request(destination: Ipv4Addr, identifier: u16, sequence_number: u16) -> Vec<u8> {
    let echo_request = echo_request_bytes(identifier, sequence_number);
    ipv4_datagram_with_protocol(Ipv4Addr::new(198, 51, 100, 1), destination, 1, 1, &echo_request)
}

pub fn quoted_udp(destination: Ipv4Addr, destination_port: u16) -> Vec<u8> {
    let mut udp_header = Vec::with_capacity(8);
    udp_header.extend_from_slice(&40000u16.to_be_bytes());
    udp_header.extend_from_slice(&destination_port.to_be_bytes());
    udp_header.extend_from_slice(&8u16.to_be_bytes());
    udp_header.extend_from_slice(&[0x00, 0x00]);
    ipv4_datagram_with_protocol(Ipv4Addr::new(198, 51, 100, 1), destination, 1, 17, &udp_header)
}

pub fn time_exceeded(source: Ipv4Addr, quoted: &[u8]) -> Vec<u8> {
    let message = icmp_message(ICMP_TIME_EXCEEDED, 0, 0, 0, quoted);
    ipv4_datagram(source, 250, &message)
}

pub fn port_unreachable(source: Ipv4Addr, quoted: &[u8]) -> Vec<u8> {
    let message = icmp_message(ICMP_DESTINATION_UNREACHABLE, 3, 0, 0, quoted);
    ipv4_datagram(source, 60, &message)
}

fn icmp_message(icmp_type: u8, code: u8, identifier: u16, sequence_number: u16, body: &[u8]) -> Vec<u8> {
    let mut header = IcmpHeader {
        icmp_type,
        code,
        checksum: 0,
        identifier,
        sequence_number,
    };
    let mut message = header.to_bytes();
    message.extend_from_slice(body);
    header.checksum = internet_checksum(&message);
    message[2..4].copy_from_slice(&header.checksum.to_be_bytes());
    message
}
