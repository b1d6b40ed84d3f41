use anyhow::{Context, Result};
use clap::ValueEnum;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::error::SelectionError;
use crate::reporter::{MetricsReporter, MetricsSink};
use crate::speedtest::{select_server, ProbeClient, Server, SpeedtestBackend};

/// What to do when a cycle fails to measure or report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum FailurePolicy {
    /// Stop the process.
    #[default]
    Exit,
    /// Log the failure and wait for the next tick.
    Continue,
}

/// Runs a cycle immediately and then once per period. Cycles never overlap;
/// a cycle that overruns the period delays the next tick.
pub struct Scheduler {
    period: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Returns only when a cycle fails.
    pub async fn run<F, Fut>(&self, mut cycle: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut ticks = interval(self.period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // First tick completes immediately.
            ticks.tick().await;
            cycle().await?;
        }
    }
}

/// Fetches the catalog and picks the measurement server.
pub async fn resolve_server<B>(
    backend: &B,
    blacklist: &BTreeSet<String>,
    max_candidates: usize,
) -> Result<Server, SelectionError>
where
    B: SpeedtestBackend + ?Sized,
{
    info!("Fetching speedtest.net configuration...");
    let candidates = backend
        .fetch_servers()
        .await
        .map_err(SelectionError::Catalog)?;

    info!("Finding the closest server...");
    select_server(backend, &candidates, blacklist, max_candidates).await
}

/// Probes the selected server and reports each successful cycle.
pub struct Agent<B, S> {
    client: ProbeClient<B>,
    reporter: MetricsReporter<S>,
    policy: FailurePolicy,
}

impl<B, S> Agent<B, S>
where
    B: SpeedtestBackend,
    S: MetricsSink,
{
    pub fn new(client: ProbeClient<B>, reporter: MetricsReporter<S>, policy: FailurePolicy) -> Self {
        Self {
            client,
            reporter,
            policy,
        }
    }

    /// One probe followed by at most one report.
    pub async fn cycle(&self) -> Result<()> {
        let result = match self.client.run_probe().await {
            Ok(result) => result,
            Err(e) => {
                error!("Failed speedtest: {}", e);
                return self.on_failure(e.into());
            }
        };

        info!("{}", result);
        if let Err(e) = self.reporter.report(&result) {
            error!("statsd error: {}", e);
            return self.on_failure(anyhow::Error::new(e).context("statsd error"));
        }
        Ok(())
    }

    fn on_failure(&self, err: anyhow::Error) -> Result<()> {
        match self.policy {
            FailurePolicy::Exit => Err(err),
            FailurePolicy::Continue => {
                warn!("continuing with the next scheduled cycle");
                Ok(())
            }
        }
    }

    /// Emits the boot counter, then cycles until a fatal failure.
    pub async fn run(&self, scheduler: &Scheduler) -> Result<()> {
        self.reporter
            .report_boot()
            .context("failed to emit boot metric")?;

        scheduler.run(move || self.cycle()).await
    }
}
