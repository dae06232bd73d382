pub use builder::{PingBuilder, TracerouteBuilder};
pub use error::NetprobeError;
pub use ping::{Ping, PingStatistics};
pub use probe::{ProbeError, ProbeMethod, ProbeResult};
pub use terminal::{PingTerminal, TracerouteTerminal};
pub use traceroute::{Traceroute, TracerouteHop};
pub use utils::dns::dns_lookup_first_ipv4_addr;

pub mod builder;
pub mod commands;
pub mod error;
pub mod ping;
pub mod probe;
pub mod proxy;
pub mod socket;
pub mod terminal;
pub mod traceroute;
pub mod utils;
pub mod web;

#[cfg(test)]
mod testing;
