use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::NetprobeError;
use crate::ping::Ping;
use crate::probe::generator::{EchoProbeTaskGenerator, IcmpProbeTaskGenerator, UdpProbeTaskGenerator};
use crate::probe::ProbeTaskGenerator;
use crate::socket::{RawSocketFactory, SocketFactory};
use crate::traceroute::Traceroute;
use crate::utils::dns::{ReverseDnsLookup, StubReverseDnsLookup};
use crate::utils::generate_u16;

pub struct PingBuilder {
    target_ip_address: Option<Ipv4Addr>,
    count: u16,
    timeout: Duration,
    interval: Duration,
    identifier: Option<u16>,
    socket_factory: Arc<dyn SocketFactory>,
}

impl PingBuilder {
    const DEFAULT_COUNT: u16 = 10;
    const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
    const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

    pub fn new() -> Self {
        Self {
            target_ip_address: None,
            count: Self::DEFAULT_COUNT,
            timeout: Self::DEFAULT_TIMEOUT,
            interval: Self::DEFAULT_INTERVAL,
            identifier: None,
            socket_factory: Arc::new(RawSocketFactory),
        }
    }

    pub fn target_ip_address(mut self, ip_addr: Ipv4Addr) -> Self {
        self.target_ip_address = Some(ip_addr);
        self
    }

    pub fn count(mut self, count: u16) -> Self {
        self.count = count;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Pins the echo identifier. A random one is drawn per session otherwise.
    pub fn identifier(mut self, identifier: u16) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn socket_factory(mut self, socket_factory: Arc<dyn SocketFactory>) -> Self {
        self.socket_factory = socket_factory;
        self
    }

    pub fn build(self) -> Result<Ping, NetprobeError> {
        let target_ip_address = self.target_ip_address.ok_or(NetprobeError::MissingDestination)?;
        let identifier = self.identifier.unwrap_or_else(generate_u16);
        let generator = EchoProbeTaskGenerator::new(identifier, self.socket_factory);

        Ok(Ping::new(
            target_ip_address,
            self.count,
            self.timeout,
            self.interval,
            Box::new(generator),
        ))
    }
}

impl Default for PingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct TracerouteBuilder;

impl TracerouteBuilder {
    pub fn udp() -> TracerouteUdpBuilder {
        TracerouteUdpBuilder::new(TracerouteBaseBuilder::new())
    }

    pub fn icmp() -> TracerouteIcmpBuilder {
        TracerouteIcmpBuilder::new(TracerouteBaseBuilder::new())
    }
}

struct TracerouteBaseBuilder {
    target_ip_address: Option<Ipv4Addr>,
    max_ttl: u8,
    nqueries: u16,
    max_wait_probe: Duration,
    is_active_dns_lookup: bool,
    socket_factory: Arc<dyn SocketFactory>,
    reverse_dns_lookup: Option<Box<dyn ReverseDnsLookup>>,
}

impl TracerouteBaseBuilder {
    const DEFAULT_MAX_TTL: u8 = 30;
    const DEFAULT_QUERIES_PER_HOP: u16 = 3;
    const DEFAULT_MAX_WAIT_PROBE: Duration = Duration::from_secs(2);
    const DEFAULT_IS_ACTIVE_DNS_LOOKUP: bool = true;

    fn new() -> Self {
        Self {
            target_ip_address: None,
            max_ttl: Self::DEFAULT_MAX_TTL,
            nqueries: Self::DEFAULT_QUERIES_PER_HOP,
            max_wait_probe: Self::DEFAULT_MAX_WAIT_PROBE,
            is_active_dns_lookup: Self::DEFAULT_IS_ACTIVE_DNS_LOOKUP,
            socket_factory: Arc::new(RawSocketFactory),
            reverse_dns_lookup: None,
        }
    }

    fn build(self, probe_task_generator: Box<dyn ProbeTaskGenerator>) -> Result<Traceroute, NetprobeError> {
        let target_ip_address = self.target_ip_address.ok_or(NetprobeError::MissingDestination)?;

        let reverse_dns_lookup = match (self.is_active_dns_lookup, self.reverse_dns_lookup) {
            (false, _) => None,
            (true, Some(reverse_dns_lookup)) => Some(reverse_dns_lookup),
            (true, None) => Some(Box::new(StubReverseDnsLookup::new()) as Box<dyn ReverseDnsLookup>),
        };

        Ok(Traceroute::new(
            target_ip_address,
            self.max_ttl,
            self.nqueries,
            self.max_wait_probe,
            probe_task_generator,
            reverse_dns_lookup,
        ))
    }
}

macro_rules! base_builder_setters {
    () => {
        pub fn target_ip_address(mut self, ip_addr: Ipv4Addr) -> Self {
            self.traceroute_base_builder.target_ip_address = Some(ip_addr);
            self
        }

        pub fn max_ttl(mut self, max_ttl: u8) -> Self {
            self.traceroute_base_builder.max_ttl = max_ttl;
            self
        }

        pub fn queries_per_hop(mut self, nqueries: u16) -> Self {
            self.traceroute_base_builder.nqueries = nqueries;
            self
        }

        pub fn max_wait_probe(mut self, max_wait_probe: Duration) -> Self {
            self.traceroute_base_builder.max_wait_probe = max_wait_probe;
            self
        }

        pub fn active_dns_lookup(mut self, active_dns_lookup: bool) -> Self {
            self.traceroute_base_builder.is_active_dns_lookup = active_dns_lookup;
            self
        }

        pub fn socket_factory(mut self, socket_factory: Arc<dyn SocketFactory>) -> Self {
            self.traceroute_base_builder.socket_factory = socket_factory;
            self
        }

        /// Replaces the system stub resolver. Ignored when DNS lookup is off.
        pub fn reverse_dns_lookup(mut self, reverse_dns_lookup: Box<dyn ReverseDnsLookup>) -> Self {
            self.traceroute_base_builder.reverse_dns_lookup = Some(reverse_dns_lookup);
            self
        }
    };
}

pub struct TracerouteUdpBuilder {
    traceroute_base_builder: TracerouteBaseBuilder,
    initial_destination_port: u16,
}

impl TracerouteUdpBuilder {
    const DEFAULT_INITIAL_DESTINATION_PORT: u16 = 33434;

    fn new(traceroute_base_builder: TracerouteBaseBuilder) -> Self {
        Self {
            initial_destination_port: Self::DEFAULT_INITIAL_DESTINATION_PORT,
            traceroute_base_builder,
        }
    }

    pub fn initial_destination_port(mut self, initial_destination_port: u16) -> Self {
        self.initial_destination_port = initial_destination_port;
        self
    }

    base_builder_setters!();

    pub fn build(self) -> Result<Traceroute, NetprobeError> {
        let socket_factory = self.traceroute_base_builder.socket_factory.clone();
        let generator = UdpProbeTaskGenerator::new(self.initial_destination_port, socket_factory);
        self.traceroute_base_builder.build(Box::new(generator))
    }
}

pub struct TracerouteIcmpBuilder {
    traceroute_base_builder: TracerouteBaseBuilder,
    icmp_id: Option<u16>,
    isn: u16,
}

impl TracerouteIcmpBuilder {
    const DEFAULT_ISN: u16 = 1;

    fn new(traceroute_base_builder: TracerouteBaseBuilder) -> Self {
        Self {
            icmp_id: None,
            isn: Self::DEFAULT_ISN,
            traceroute_base_builder,
        }
    }

    pub fn identifier(mut self, icmp_id: u16) -> Self {
        self.icmp_id = Some(icmp_id);
        self
    }

    pub fn initial_sequence_number(mut self, isn: u16) -> Self {
        self.isn = isn;
        self
    }

    base_builder_setters!();

    pub fn build(self) -> Result<Traceroute, NetprobeError> {
        let socket_factory = self.traceroute_base_builder.socket_factory.clone();
        let icmp_id = self.icmp_id.unwrap_or_else(generate_u16);
        let generator = IcmpProbeTaskGenerator::new(icmp_id, self.isn, socket_factory);
        self.traceroute_base_builder.build(Box::new(generator))
    }
}
