use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::speedtest::catalog::CATALOG_URL;

/// Shortest allowed polling period.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Hosts never selected, however reachable.
    pub server_blacklist: BTreeSet<String>,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Length of each download and upload sample.
    #[serde(with = "humantime_serde")]
    pub probe_duration: Duration,
    /// Metric name prefix.
    pub namespace: String,
    /// Name of the local network, attached to every sample.
    pub network_label: String,
    pub statsd_address: String,
    /// Latency probes attempted during server selection.
    pub max_candidates: usize,
    /// Endpoint listing candidate servers.
    pub catalog_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_blacklist: BTreeSet::new(),
            poll_interval: Duration::from_secs(30),
            probe_duration: Duration::from_secs(1),
            namespace: "speedtest".to_string(),
            network_label: "unknown".to_string(),
            statsd_address: "localhost:8125".to_string(),
            max_candidates: 5,
            catalog_url: CATALOG_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads the config file, or returns `None` if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval < MIN_POLL_INTERVAL {
            return Err(ConfigError::Validation(format!(
                "poll interval {:?} is shorter than {:?}",
                self.poll_interval, MIN_POLL_INTERVAL
            )));
        }
        if self.probe_duration.is_zero() {
            return Err(ConfigError::Validation(
                "probe duration must be non-zero".to_string(),
            ));
        }
        if self.namespace.trim().is_empty() {
            return Err(ConfigError::Validation(
                "namespace must not be empty".to_string(),
            ));
        }
        if !self.catalog_url.starts_with("http://") && !self.catalog_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "catalogUrl {:?} is not an http(s) URL",
                self.catalog_url
            )));
        }
        if self.max_candidates == 0 {
            return Err(ConfigError::Validation(
                "maxCandidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
