use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use futures::{pin_mut, StreamExt};

use crate::ping::{Ping, PingStatistics};
use crate::probe::{ProbeError, ProbeReply, ProbeResult};
use crate::traceroute::{Traceroute, TracerouteHop};

impl Display for TracerouteHop {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ttl = self.ttl();
        let Some(address) = self.responder_address() else {
            return write!(f, "{ttl} * * *");
        };

        let hostname = self.responder_hostname().map(str::to_string).unwrap_or_else(|| address.to_string());
        write!(f, "{ttl} {hostname} ({address})")?;

        let samples: Vec<String> = self
            .measurements()
            .iter()
            .map(|measurement| match measurement {
                Some(rtt) => format!("{:.3} ms", rtt.as_secs_f64() * 1000f64),
                None => String::from("*"),
            })
            .collect();

        write!(f, " {}", samples.join("  "))
    }
}

pub fn format_ping_header(hostname: &str, ip_addr: Ipv4Addr, count: u16, timeout: Duration) -> String {
    format!(
        "PING {hostname} ({ip_addr}): {count} probes, timeout {}",
        humantime::format_duration(timeout)
    )
}

pub fn format_reply(reply: &ProbeReply, host: Option<&str>) -> String {
    let address = match host {
        Some(host) => format!("{} ({host})", reply.from_address()),
        None => reply.from_address().to_string(),
    };

    format!(
        "{} bytes from {address}: icmp_seq={} ttl={} time={:.3} ms",
        reply.packet_size(),
        reply.sequence_number(),
        reply.ttl(),
        reply.rtt_ms(),
    )
}

pub fn format_timeout(sequence_number: u16) -> String {
    format!("Request timeout for icmp_seq {sequence_number}")
}

pub fn format_summary(statistics: &PingStatistics, hostname: &str) -> String {
    let mut summary = format!(
        "--- {hostname} ping statistics ---\n{} packets transmitted, {} received, {:.2}% packet loss",
        statistics.transmitted(),
        statistics.received(),
        statistics.packet_loss(),
    );

    if let Some(rtt_summary) = statistics.rtt_summary() {
        summary.push_str(&format!(
            "\nrtt min/avg/max = {:.2}/{:.2}/{:.2} ms",
            rtt_summary.min_ms, rtt_summary.avg_ms, rtt_summary.max_ms,
        ));
    }

    summary
}

pub fn format_trace_header(hostname: &str, ip_addr: Ipv4Addr, max_ttl: u8, queries_per_hop: u16) -> String {
    format!("traceroute to {hostname} ({ip_addr}), {max_ttl} hops max, {queries_per_hop} probes per hop")
}

pub struct PingTerminal {
    ping: Ping,
    hostname: String,
}

impl PingTerminal {
    pub fn new(ping: Ping, hostname: impl Into<String>) -> Self {
        Self {
            ping,
            hostname: hostname.into(),
        }
    }

    /// Prints every probe as it completes, then the summary. A fatal probe
    /// error ends the session without a summary.
    pub async fn print_ping(self) -> Result<PingStatistics, ProbeError> {
        let destination_address = self.ping.destination_address();
        let is_literal_address = Ipv4Addr::from_str(&self.hostname).is_ok();

        println!(
            "{}",
            format_ping_header(&self.hostname, destination_address, self.ping.count(), self.ping.timeout())
        );

        let mut statistics = PingStatistics::new();
        let ping_stream = self.ping.ping();
        pin_mut!(ping_stream);

        while let Some(probe_result) = ping_stream.next().await {
            let probe_result = probe_result?;
            match &probe_result {
                ProbeResult::Reply(reply) => {
                    let host = if !is_literal_address && reply.from_address() == destination_address {
                        Some(self.hostname.as_str())
                    } else {
                        None
                    };
                    println!("{}", format_reply(reply, host));
                }
                ProbeResult::Timeout { sequence_number } => println!("{}", format_timeout(*sequence_number)),
            }
            statistics.record(&probe_result);
        }

        println!("\n{}", format_summary(&statistics, &self.hostname));
        Ok(statistics)
    }
}

pub struct TracerouteTerminal {
    traceroute: Traceroute,
    hostname: String,
}

impl TracerouteTerminal {
    pub fn new(traceroute: Traceroute, hostname: impl Into<String>) -> Self {
        Self {
            traceroute,
            hostname: hostname.into(),
        }
    }

    pub async fn print_trace(self) -> Result<(), ProbeError> {
        println!(
            "{}",
            format_trace_header(
                &self.hostname,
                self.traceroute.destination_address(),
                self.traceroute.max_ttl(),
                self.traceroute.queries_per_hop(),
            )
        );

        let traceroute_stream = self.traceroute.trace();
        pin_mut!(traceroute_stream);

        while let Some(hop) = traceroute_stream.next().await {
            println!("{}", hop?);
        }

        Ok(())
    }
}
