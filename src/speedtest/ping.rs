use std::time::{Duration, Instant};

use super::catalog::server_url;
use super::Server;
use crate::error::BackendError;

const LATENCY_RESOURCE: &str = "latency.txt";

/// Times `ping_count` small requests and takes the median.
pub struct PingTest {
    ping_count: usize,
}

impl PingTest {
    pub fn new(ping_count: usize) -> Self {
        Self { ping_count }
    }

    pub async fn run(
        &self,
        client: &reqwest::Client,
        server: &Server,
    ) -> Result<Duration, BackendError> {
        let url = server_url(server, LATENCY_RESOURCE);
        let mut samples = Vec::with_capacity(self.ping_count);

        for _ in 0..self.ping_count {
            let start = Instant::now();
            client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            samples.push(start.elapsed());
        }

        median(&mut samples)
            .ok_or_else(|| BackendError::InvalidResponse("no latency samples".to_string()))
    }
}

/// Median of the samples; the mean of the middle pair for even counts.
pub fn median(samples: &mut [Duration]) -> Option<Duration> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();

    let mid = samples.len() / 2;
    if samples.len() % 2 == 1 {
        Some(samples[mid])
    } else {
        Some((samples[mid - 1] + samples[mid]) / 2)
    }
}
