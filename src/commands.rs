//! One entry point per command. Each resolves its target, runs to completion
//! and prints to stdout.

use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

use crate::builder::{PingBuilder, TracerouteBuilder};
use crate::error::NetprobeError;
use crate::probe::ProbeMethod;
use crate::proxy::{MemoryDiskCache, Proxy};
use crate::terminal::{PingTerminal, TracerouteTerminal};
use crate::utils::dns::dns_lookup_first_ipv4_addr;
use crate::web::WebServer;

pub async fn run_ping(hostname: &str, count: u16, timeout: Duration) -> Result<(), NetprobeError> {
    let ip_addr = dns_lookup_first_ipv4_addr(hostname)
        .await
        .ok_or_else(|| NetprobeError::HostnameNotResolved(hostname.to_string()))?;
    debug!(%hostname, %ip_addr, "resolved ping target");

    let ping = PingBuilder::new()
        .target_ip_address(ip_addr)
        .count(count)
        .timeout(timeout)
        .build()?;

    PingTerminal::new(ping, hostname).print_ping().await?;
    Ok(())
}

pub async fn run_traceroute(hostname: &str, protocol: ProbeMethod, timeout: Duration) -> Result<(), NetprobeError> {
    run_traceroute_with(hostname, protocol, timeout, 30, 3, false).await
}

pub async fn run_traceroute_with(
    hostname: &str,
    protocol: ProbeMethod,
    timeout: Duration,
    max_hops: u8,
    queries: u16,
    numeric: bool,
) -> Result<(), NetprobeError> {
    let ip_addr = dns_lookup_first_ipv4_addr(hostname)
        .await
        .ok_or_else(|| NetprobeError::HostnameNotResolved(hostname.to_string()))?;
    debug!(%hostname, %ip_addr, ?protocol, "resolved traceroute target");

    let traceroute = match protocol {
        ProbeMethod::UDP => TracerouteBuilder::udp()
            .target_ip_address(ip_addr)
            .max_ttl(max_hops)
            .queries_per_hop(queries)
            .max_wait_probe(timeout)
            .active_dns_lookup(!numeric)
            .build()?,
        ProbeMethod::ICMP => TracerouteBuilder::icmp()
            .target_ip_address(ip_addr)
            .max_ttl(max_hops)
            .queries_per_hop(queries)
            .max_wait_probe(timeout)
            .active_dns_lookup(!numeric)
            .build()?,
    };

    TracerouteTerminal::new(traceroute, hostname).print_trace().await?;
    Ok(())
}

pub async fn run_web_server(port: u16, root: PathBuf) -> Result<(), NetprobeError> {
    let web_server = WebServer::bind(port, root).await?;
    println!("Serving HTTP on {}", web_server.local_addr()?);
    web_server.run().await?;
    Ok(())
}

pub async fn run_proxy(port: u16, cache_dir: PathBuf) -> Result<(), NetprobeError> {
    let cache = MemoryDiskCache::new(cache_dir).await?;
    let proxy = Proxy::bind(port, cache).await?;
    println!("Proxy listening on {}", proxy.local_addr()?);
    proxy.run().await?;
    Ok(())
}
