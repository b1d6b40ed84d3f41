//! Delivery of probe results to statsd.

use std::net::UdpSocket;

use cadence::prelude::*;
use cadence::{MetricResult, StatsdClient, UdpMetricSink};
use tracing::debug;

use crate::error::{ReportError, SampleName};
use crate::speedtest::{Server, SpeedTestResult};

const BOOT_METRIC: &str = "boot";

/// Destination for named numeric samples.
pub trait MetricsSink: Send + Sync {
    fn histogram(&self, name: &str, value: f64, tags: &[String]) -> MetricResult<()>;

    fn count(&self, name: &str, value: i64, tags: &[String]) -> MetricResult<()>;
}

/// Statsd client with a fixed namespace prefix, sending over UDP.
pub struct StatsdSink {
    client: StatsdClient,
}

impl StatsdSink {
    pub fn connect(address: &str, namespace: &str) -> MetricResult<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let sink = UdpMetricSink::from(address, socket)?;

        Ok(Self {
            client: StatsdClient::from_sink(namespace, sink),
        })
    }
}

impl MetricsSink for StatsdSink {
    fn histogram(&self, name: &str, value: f64, tags: &[String]) -> MetricResult<()> {
        let mut metric = self.client.histogram_with_tags(name, value);
        for tag in tags {
            metric = metric.with_tag_value(tag);
        }
        metric.try_send().map(|_| ())
    }

    fn count(&self, name: &str, value: i64, tags: &[String]) -> MetricResult<()> {
        let mut metric = self.client.count_with_tags(name, value);
        for tag in tags {
            metric = metric.with_tag_value(tag);
        }
        metric.try_send().map(|_| ())
    }
}

/// One named observation taken from a probe result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub name: SampleName,
    pub value: f64,
}

/// Samples for a result in emission order. Speeds are bits per second, ping is
/// milliseconds.
pub fn samples(result: &SpeedTestResult) -> [Sample; 3] {
    [
        Sample {
            name: SampleName::Download,
            value: result.download.bits_per_sec() as f64,
        },
        Sample {
            name: SampleName::Upload,
            value: result.upload.bits_per_sec() as f64,
        },
        Sample {
            name: SampleName::Ping,
            value: result.ping.as_micros() as f64 / 1000.0,
        },
    ]
}

/// Emits probe results through a sink with tags fixed at construction.
pub struct MetricsReporter<S> {
    sink: S,
    tags: Vec<String>,
}

impl<S: MetricsSink> MetricsReporter<S> {
    pub fn new(sink: S, server: &Server, network_label: &str) -> Self {
        Self {
            sink,
            tags: vec![
                format!("speedtest.server:{}", server.host),
                format!("speedtest.location:{}", server.name),
                format!("speedtest.network:{}", network_label),
            ],
        }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Counts one process start.
    pub fn report_boot(&self) -> MetricResult<()> {
        self.sink.count(BOOT_METRIC, 1, &self.tags)
    }

    /// Emits download, upload and ping in that order, stopping at the first
    /// sample the sink rejects.
    pub fn report(&self, result: &SpeedTestResult) -> Result<(), ReportError> {
        for sample in samples(result) {
            self.sink
                .histogram(sample.name.as_str(), sample.value, &self.tags)
                .map_err(|source| ReportError {
                    sample: sample.name,
                    source,
                })?;
            debug!(sample = %sample.name, value = sample.value, "emitted");
        }
        Ok(())
    }
}
