use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::{ProbeOutcome, ProbeStep, Server, SpeedTestResult, SpeedtestBackend};
use crate::error::{BackendError, ProbeStepError};

/// Round trips per ping measurement; the median is reported.
const PING_COUNT: usize = 3;

/// Runs probe cycles against one server for the life of the process.
pub struct ProbeClient<B> {
    backend: B,
    server: Server,
    probe_duration: Duration,
}

impl<B: SpeedtestBackend> ProbeClient<B> {
    pub fn new(backend: B, server: Server, probe_duration: Duration) -> Self {
        Self {
            backend,
            server,
            probe_duration,
        }
    }

    /// Host of the measurement server.
    pub fn host(&self) -> &str {
        &self.server.host
    }

    /// Location of the measurement server.
    pub fn location(&self) -> &str {
        &self.server.name
    }

    /// Download, upload, then ping. Stops at the first failing step.
    pub async fn run_probe(&self) -> ProbeOutcome {
        let download = step(
            ProbeStep::Download,
            self.backend
                .measure_downstream(&self.server, self.probe_duration),
        )
        .await?;

        let upload = step(
            ProbeStep::Upload,
            self.backend.measure_upstream(&self.server, self.probe_duration),
        )
        .await?;

        let ping = step(
            ProbeStep::Ping,
            self.backend.ping(&self.server, PING_COUNT),
        )
        .await?;

        Ok(SpeedTestResult {
            download,
            upload,
            ping,
        })
    }
}

/// Awaits one measurement, tagging a failure with the step that produced it.
async fn step<T, F>(step: ProbeStep, measurement: F) -> Result<T, ProbeStepError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    debug!(%step, "measuring");
    measurement
        .await
        .map_err(|source| ProbeStepError { step, source })
}
