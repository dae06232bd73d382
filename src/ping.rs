use std::net::Ipv4Addr;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::time::sleep;
use tracing::warn;

use crate::probe::{ProbeError, ProbeResult, ProbeTaskGenerator};

/// An echo probe session: `count` probes, one at a time, `interval` apart.
pub struct Ping {
    destination_address: Ipv4Addr,
    count: u16,
    timeout: Duration,
    interval: Duration,
    probe_task_generator: Box<dyn ProbeTaskGenerator>,
}

impl Ping {
    pub fn new(
        destination_address: Ipv4Addr,
        count: u16,
        timeout: Duration,
        interval: Duration,
        probe_task_generator: Box<dyn ProbeTaskGenerator>,
    ) -> Self {
        Self {
            destination_address,
            count,
            timeout,
            interval,
            probe_task_generator,
        }
    }

    pub fn destination_address(&self) -> Ipv4Addr {
        self.destination_address
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Yields one result per sequence number. A probe that could not be sent
    /// is reported as lost; the stream ends after the first fatal error.
    pub fn ping(mut self) -> impl Stream<Item = Result<ProbeResult, ProbeError>> {
        stream! {
            for index in 0..self.count {
                if index > 0 {
                    sleep(self.interval).await;
                }

                let mut probe_task = match self.probe_task_generator.generate_probe_task(self.destination_address) {
                    Ok(probe_task) => probe_task,
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                };

                let sequence_number = probe_task.sequence_number();
                let probe_result = probe_task.send_probe(None, self.timeout).await;
                drop(probe_task);

                match probe_result {
                    Ok(probe_result) => {
                        yield Ok(probe_result);
                    }
                    Err(ProbeError::Send { source, .. }) => {
                        warn!(sequence_number, %source, "echo request not sent, counted as lost");
                        yield Ok(ProbeResult::Timeout { sequence_number });
                    }
                    Err(error) => {
                        yield Err(error);
                        break;
                    }
                }
            }
        }
    }
}

/// Round-trip summary over all replies, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RttSummary {
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
}

#[derive(Clone, Debug, Default)]
pub struct PingStatistics {
    transmitted: usize,
    rtts: Vec<Duration>,
}

impl PingStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, probe_result: &ProbeResult) {
        self.transmitted += 1;
        if let Some(reply) = probe_result.reply() {
            self.rtts.push(reply.rtt());
        }
    }

    pub fn transmitted(&self) -> usize {
        self.transmitted
    }

    pub fn received(&self) -> usize {
        self.rtts.len()
    }

    pub fn lost(&self) -> usize {
        self.transmitted - self.received()
    }

    pub fn packet_loss(&self) -> f64 {
        if self.transmitted == 0 {
            return 0f64;
        }

        100f64 * self.lost() as f64 / self.transmitted as f64
    }

    pub fn rtt_summary(&self) -> Option<RttSummary> {
        if self.rtts.is_empty() {
            return None;
        }

        let rtts_ms: Vec<f64> = self.rtts
            .iter()
            .map(|rtt| rtt.as_secs_f64() * 1000f64)
            .collect();

        let min_ms = rtts_ms.iter().copied().fold(f64::INFINITY, f64::min);
        let max_ms = rtts_ms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg_ms = rtts_ms.iter().sum::<f64>() / rtts_ms.len() as f64;

        Some(RttSummary { min_ms, avg_ms, max_ms })
    }
}
