use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use async_netprobe::commands;
use async_netprobe::ProbeMethod;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(name = "netprobe")]
#[command(bin_name = "netprobe")]
struct NetprobeOptions {
    /// Log probe traffic and discarded datagrams to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send ICMP echo requests to a host
    #[command(visible_alias = "p")]
    Ping {
        #[arg(required = true, index = 1)]
        hostname: String,

        /// Number of echo requests to send
        #[arg(short, long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..))]
        count: u16,

        /// Wait for a reply no more than <TIMEOUT> (seconds or e.g. 500ms)
        #[arg(short, long, value_parser = parse_timeout, default_value = "2")]
        timeout: Duration,
    },

    /// Print the route packets take to a host
    #[command(visible_alias = "t")]
    Traceroute {
        #[arg(required = true, index = 1)]
        hostname: String,

        #[arg(short, long, value_enum, default_value = "icmp")]
        protocol: ProbeMethod,

        /// Wait for a probe no more than <TIMEOUT> (seconds or e.g. 500ms)
        #[arg(short, long, value_parser = parse_timeout, default_value = "2")]
        timeout: Duration,

        /// Set the max number of hops (max TTL to be reached)
        #[arg(short, long, default_value_t = 30, value_parser = clap::value_parser!(u8).range(1..=255))]
        max_hops: u8,

        /// Set the number of probes per each hop
        #[arg(short, long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..=10))]
        queries: u16,

        /// Do not resolve IP addresses to their domain names
        #[arg(short = 'n', long)]
        numeric: bool,
    },

    /// Serve files from a directory over HTTP on 127.0.0.1
    #[command(visible_alias = "w")]
    Web {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,

        /// Directory to serve
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },

    /// Run a caching HTTP proxy on 127.0.0.1
    #[command(visible_alias = "x")]
    Proxy {
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// Directory holding the on-disk cache slot
        #[arg(short = 'd', long, default_value = "cache")]
        cache_dir: PathBuf,
    },
}

/// Accepts a bare number of seconds or a humantime duration.
fn parse_timeout(value: &str) -> Result<Duration, String> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(Duration::from_secs(seconds));
    }

    humantime::parse_duration(value).map_err(|error| error.to_string())
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), String> {
    let netprobe_options = NetprobeOptions::parse();
    init_tracing(netprobe_options.verbose);

    let result = match netprobe_options.command {
        Command::Ping { hostname, count, timeout } => commands::run_ping(&hostname, count, timeout).await,
        Command::Traceroute { hostname, protocol, timeout, max_hops, queries, numeric } => {
            commands::run_traceroute_with(&hostname, protocol, timeout, max_hops, queries, numeric).await
        }
        Command::Web { port, root } => commands::run_web_server(port, root).await,
        Command::Proxy { port, cache_dir } => commands::run_proxy(port, cache_dir).await,
    };

    result.map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_accepts_bare_seconds() {
        assert_eq!(parse_timeout("3"), Ok(Duration::from_secs(3)));
    }

    #[test]
    fn timeout_accepts_humantime() {
        assert_eq!(parse_timeout("500ms"), Ok(Duration::from_millis(500)));
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn traceroute_alias_and_defaults() {
        let options = NetprobeOptions::try_parse_from(["netprobe", "t", "example.com", "-n"]).unwrap();
        match options.command {
            Command::Traceroute { hostname, protocol, timeout, max_hops, queries, numeric } => {
                assert_eq!(hostname, "example.com");
                assert_eq!(protocol, ProbeMethod::ICMP);
                assert_eq!(timeout, Duration::from_secs(2));
                assert_eq!((max_hops, queries, numeric), (30, 3, true));
            }
            command => panic!("unexpected command {command:?}"),
        }
    }

    #[test]
    fn ping_count_must_be_positive() {
        assert!(NetprobeOptions::try_parse_from(["netprobe", "ping", "localhost", "-c", "0"]).is_err());
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        NetprobeOptions::command().debug_assert();
    }
}
