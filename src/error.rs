//! Error types for server selection, probing, reporting and configuration.

use std::fmt;

use cadence::MetricError;
use thiserror::Error;

use crate::speedtest::ProbeStep;

/// Failure talking to a speedtest server or the server catalog.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed or returned an error status.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Socket level failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The server answered with something we could not use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// No usable measurement server could be found at startup.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("failed to fetch server catalog: {0}")]
    Catalog(#[source] BackendError),

    #[error("no available servers ({probed} probed)")]
    NoAvailableServer { probed: usize },
}

/// One step of a probe cycle failed; later steps were skipped.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct ProbeStepError {
    pub step: ProbeStep,
    #[source]
    pub source: BackendError,
}

/// Name of a sample emitted by the reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleName {
    Download,
    Upload,
    Ping,
}

impl SampleName {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleName::Download => "download",
            SampleName::Upload => "upload",
            SampleName::Ping => "ping",
        }
    }
}

impl fmt::Display for SampleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric sample could not be handed to the sink.
#[derive(Debug, Error)]
#[error("failed to emit {sample} sample: {source}")]
pub struct ReportError {
    pub sample: SampleName,
    #[source]
    pub source: MetricError,
}

/// Configuration could not be loaded or is invalid.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse JSON config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config validation error: {0}")]
    Validation(String),
}
