use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tracing::{debug, warn};

use crate::probe::{ProbeError, ProbeResult, ProbeTaskGenerator};
use crate::utils::dns::ReverseDnsLookup;

/// Everything learned about one TTL value.
#[derive(Clone, Debug, PartialEq)]
pub struct TracerouteHop {
    ttl: u8,
    measurements: Vec<Option<Duration>>,
    responder_address: Option<Ipv4Addr>,
    responder_hostname: Option<String>,
}

impl TracerouteHop {
    pub fn new(ttl: u8, queries_per_hop: u16) -> Self {
        Self {
            ttl,
            measurements: Vec::with_capacity(queries_per_hop as usize),
            responder_address: None,
            responder_hostname: None,
        }
    }

    /// Records one sample. The first answering address becomes the hop's responder.
    pub fn add_result(&mut self, probe_result: &ProbeResult) {
        match probe_result.reply() {
            Some(reply) => {
                self.measurements.push(Some(reply.rtt()));
                if self.responder_address.is_none() {
                    self.responder_address = Some(reply.from_address());
                }
            }
            None => self.measurements.push(None),
        }
    }

    pub fn set_responder_hostname(&mut self, hostname: String) {
        self.responder_hostname = Some(hostname);
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn measurements(&self) -> &[Option<Duration>] {
        &self.measurements
    }

    pub fn responder_address(&self) -> Option<Ipv4Addr> {
        self.responder_address
    }

    pub fn responder_hostname(&self) -> Option<&str> {
        self.responder_hostname.as_deref()
    }

    pub fn is_no_reply(&self) -> bool {
        self.responder_address.is_none()
    }
}

/// Maps the path to a destination one TTL at a time.
pub struct Traceroute {
    destination_address: Ipv4Addr,
    max_ttl: u8,
    queries_per_hop: u16,
    max_wait_probe: Duration,
    probe_task_generator: Box<dyn ProbeTaskGenerator>,
    reverse_dns_lookup: Option<Box<dyn ReverseDnsLookup>>,
}

impl Traceroute {
    pub fn new(
        destination_address: Ipv4Addr,
        max_ttl: u8,
        queries_per_hop: u16,
        max_wait_probe: Duration,
        probe_task_generator: Box<dyn ProbeTaskGenerator>,
        reverse_dns_lookup: Option<Box<dyn ReverseDnsLookup>>,
    ) -> Self {
        Self {
            destination_address,
            max_ttl,
            queries_per_hop,
            max_wait_probe,
            probe_task_generator,
            reverse_dns_lookup,
        }
    }

    pub fn destination_address(&self) -> Ipv4Addr {
        self.destination_address
    }

    pub fn max_ttl(&self) -> u8 {
        self.max_ttl
    }

    pub fn queries_per_hop(&self) -> u16 {
        self.queries_per_hop
    }

    /// Yields one hop per TTL, stopping once the destination answers or
    /// `max_ttl` is reached. Every sample is its own probe; no extra probe is
    /// spent discovering the responder.
    pub fn trace(mut self) -> impl Stream<Item = Result<TracerouteHop, ProbeError>> {
        stream! {
            for ttl in 1..=self.max_ttl {
                let mut hop = TracerouteHop::new(ttl, self.queries_per_hop);

                for _ in 0..self.queries_per_hop {
                    let probe_result = match self.send_probe(ttl).await {
                        Ok(probe_result) => probe_result,
                        Err(error) => {
                            yield Err(error);
                            return;
                        }
                    };
                    hop.add_result(&probe_result);
                }

                if let Some(responder_address) = hop.responder_address() {
                    let hostname = self.lookup_hostname(responder_address).await;
                    hop.set_responder_hostname(hostname);
                }

                let is_destination_reached = hop.responder_address() == Some(self.destination_address);
                debug!(ttl, responder = ?hop.responder_address(), is_destination_reached, "hop completed");
                yield Ok(hop);

                if is_destination_reached {
                    break;
                }
            }
        }
    }

    /// A probe that could not be sent counts as an unanswered sample.
    async fn send_probe(&mut self, ttl: u8) -> Result<ProbeResult, ProbeError> {
        let mut probe_task = self.probe_task_generator.generate_probe_task(self.destination_address)?;
        let sequence_number = probe_task.sequence_number();

        match probe_task.send_probe(Some(ttl), self.max_wait_probe).await {
            Err(ProbeError::Send { source, .. }) => {
                warn!(ttl, sequence_number, %source, "probe not sent");
                Ok(ProbeResult::Timeout { sequence_number })
            }
            probe_result => probe_result,
        }
    }

    /// Falls back to the numeric address when lookup is disabled or fails.
    async fn lookup_hostname(&self, address: Ipv4Addr) -> String {
        let hostname = match &self.reverse_dns_lookup {
            Some(reverse_dns_lookup) => reverse_dns_lookup.lookup_hostname(IpAddr::V4(address)).await,
            None => None,
        };

        hostname.unwrap_or_else(|| address.to_string())
    }
}
