use std::io;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use thiserror::Error;

pub use generator::ProbeTaskGenerator;
pub use parser::ProbeResponseParser;
pub use task::ProbeTask;

pub mod generator;
pub mod parser;
pub mod task;

/// A response correlated with an in-flight probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResponse {
    from_address: Ipv4Addr,
    ttl: u8,
    packet_size: usize,
    sequence_number: u16,
    icmp_type: u8,
}

impl ProbeResponse {
    pub fn new(from_address: Ipv4Addr, ttl: u8, packet_size: usize, sequence_number: u16, icmp_type: u8) -> Self {
        Self {
            from_address,
            ttl,
            packet_size,
            sequence_number,
            icmp_type,
        }
    }

    pub fn from_address(&self) -> Ipv4Addr {
        self.from_address
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProbeReply {
    rtt: Duration,
    ttl: u8,
    packet_size: usize,
    sequence_number: u16,
    from_address: Ipv4Addr,
    icmp_type: u8,
}

impl ProbeReply {
    pub fn new(response: ProbeResponse, rtt: Duration) -> Self {
        Self {
            rtt,
            ttl: response.ttl,
            packet_size: response.packet_size,
            sequence_number: response.sequence_number,
            from_address: response.from_address,
            icmp_type: response.icmp_type,
        }
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn rtt_ms(&self) -> f64 {
        self.rtt.as_secs_f64() * 1000f64
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn packet_size(&self) -> usize {
        self.packet_size
    }

    pub fn sequence_number(&self) -> u16 {
        self.sequence_number
    }

    pub fn from_address(&self) -> Ipv4Addr {
        self.from_address
    }

    pub fn icmp_type(&self) -> u8 {
        self.icmp_type
    }
}

/// Outcome of one send/receive cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum ProbeResult {
    Reply(ProbeReply),
    Timeout { sequence_number: u16 },
}

impl ProbeResult {
    pub fn reply(&self) -> Option<&ProbeReply> {
        match self {
            ProbeResult::Reply(reply) => Some(reply),
            ProbeResult::Timeout { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProbeResult::Timeout { .. })
    }

    pub fn sequence_number(&self) -> u16 {
        match self {
            ProbeResult::Reply(reply) => reply.sequence_number,
            ProbeResult::Timeout { sequence_number } => *sequence_number,
        }
    }
}

/// Probe failures. Timeouts are a [`ProbeResult`], not an error. Sessions
/// count a `Send` failure as a lost probe and stop on the others.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("unable to open a raw socket (are you root?): {0}")]
    SocketCreation(#[source] io::Error),

    #[error("unable to send probe{}: {source}", .ttl.map(|ttl| format!(" (ttl {ttl})")).unwrap_or_default())]
    Send {
        ttl: Option<u8>,
        #[source]
        source: io::Error,
    },

    #[error("unable to receive probe response: {0}")]
    Receive(#[source] io::Error),
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeMethod {
    ICMP,
    UDP,
}

/// Remembers when a probe left so its response can be timed.
pub struct CompletableProbe {
    sent_at: Instant,
}

impl CompletableProbe {
    pub fn new() -> Self {
        Self {
            sent_at: Instant::now(),
        }
    }

    pub fn complete(&self, probe_response: ProbeResponse) -> ProbeReply {
        ProbeReply::new(probe_response, self.sent_at.elapsed())
    }
}

impl Default for CompletableProbe {
    fn default() -> Self {
        Self::new()
    }
}
