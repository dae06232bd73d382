use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use async_trait::async_trait;
use domain::resolv::StubResolver;
use tracing::debug;

/// Resolves `hostname` (or a dotted-quad literal) to its first IPv4 address.
pub async fn dns_lookup_first_ipv4_addr(hostname: &str) -> Option<Ipv4Addr> {
    if let Ok(ipv4_addr) = Ipv4Addr::from_str(hostname) {
        return Some(ipv4_addr);
    }

    let sock_addrs = match tokio::net::lookup_host((hostname, 0)).await {
        Ok(sock_addrs) => sock_addrs,
        Err(error) => {
            debug!(%hostname, %error, "hostname lookup failed");
            return None;
        }
    };

    sock_addrs
        .filter_map(|sock_addr| match sock_addr.ip() {
            IpAddr::V4(ipv4_addr) => Some(ipv4_addr),
            IpAddr::V6(_) => None,
        })
        .next()
}

#[async_trait(?Send)]
pub trait ReverseDnsLookup {
    async fn lookup_hostname(&self, ip_addr: IpAddr) -> Option<String>;
}

pub struct StubReverseDnsLookup {
    resolver: StubResolver,
}

impl StubReverseDnsLookup {
    pub fn new() -> Self {
        Self {
            resolver: StubResolver::new(),
        }
    }
}

impl Default for StubReverseDnsLookup {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl ReverseDnsLookup for StubReverseDnsLookup {
    async fn lookup_hostname(&self, ip_addr: IpAddr) -> Option<String> {
        let found_addrs = match self.resolver.lookup_addr(ip_addr).await {
            Ok(found_addrs) => found_addrs,
            Err(error) => {
                debug!(%ip_addr, %error, "reverse lookup failed");
                return None;
            }
        };

        let hostname = found_addrs.iter().next()?.to_string();
        let hostname = hostname.trim_end_matches('.');
        if hostname.is_empty() {
            return None;
        }

        Some(hostname.to_string())
    }
}
