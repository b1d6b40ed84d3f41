pub mod catalog;
pub mod client;
pub mod download;
pub mod ping;
pub mod select;
pub mod upload;

#[cfg(test)]
pub mod testing;

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ProbeStepError;

pub use catalog::{HttpBackend, SpeedtestBackend};
pub use client::ProbeClient;
pub use select::select_server;

/// A measurement server as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Server {
    /// `host:port` of the server.
    pub host: String,
    /// City or location name.
    pub name: String,
    #[serde(default)]
    pub sponsor: String,
    /// Distance in km as reported by the catalog.
    #[serde(default)]
    pub distance: Option<f64>,
}

#[cfg(test)]
impl Server {
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
            sponsor: String::new(),
            distance: None,
        }
    }
}

/// Bandwidth in bits per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Speed(pub u64);

impl Speed {
    /// Speed of moving `bytes` in `elapsed`. Zero elapsed time yields zero.
    pub fn from_transfer(bytes: u64, elapsed: Duration) -> Self {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return Speed(0);
        }
        Speed(((bytes as f64 * 8.0) / secs) as u64)
    }

    pub fn bits_per_sec(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Thresholds sit where the smaller unit would round up to 1000.
        let bps = self.0 as f64;
        if self.0 >= 999_950_000 {
            write!(f, "{:.1} Gbps", bps / 1e9)
        } else if self.0 >= 999_500 {
            write!(f, "{:.1} Mbps", bps / 1e6)
        } else if self.0 >= 1_000 {
            write!(f, "{:.0} Kbps", bps / 1e3)
        } else {
            write!(f, "{} bps", self.0)
        }
    }
}

/// Steps of a probe cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    Download,
    Upload,
    Ping,
}

impl fmt::Display for ProbeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProbeStep::Download => "download",
            ProbeStep::Upload => "upload",
            ProbeStep::Ping => "ping",
        })
    }
}

/// A fully measured probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedTestResult {
    pub download: Speed,
    pub upload: Speed,
    pub ping: Duration,
}

impl fmt::Display for SpeedTestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Download: {}  Upload: {}  Ping: {:?}",
            self.download, self.upload, self.ping
        )
    }
}

/// Outcome of one probe cycle: every value measured, or the step that failed.
pub type ProbeOutcome = Result<SpeedTestResult, ProbeStepError>;
