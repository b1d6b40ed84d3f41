mod app;
mod error;
mod reporter;
mod settings;
mod speedtest;

use anyhow::{Context, Result};
use app::{resolve_server, Agent, FailurePolicy, Scheduler};
use clap::Parser;
use reporter::{MetricsReporter, StatsdSink};
use settings::Settings;
use speedtest::{HttpBackend, ProbeClient};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Periodic internet speed test reporting to statsd.
#[derive(Parser, Debug)]
#[command(name = "speedwatch", version, about, long_about = None)]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, default_value = "speedwatch.json", env = "SPEEDWATCH_CONFIG")]
    config: String,

    /// Address of the statsd agent
    #[arg(long, env = "SPEEDWATCH_STATSD_ADDRESS")]
    statsd_address: Option<String>,

    /// Name of the network being monitored
    #[arg(long, env = "SPEEDWATCH_NETWORK_LABEL")]
    network_label: Option<String>,

    /// Wait time between successive speed tests
    #[arg(long, value_parser = humantime::parse_duration, env = "SPEEDWATCH_POLL")]
    poll: Option<Duration>,

    /// Length of each download and upload sample
    #[arg(long, value_parser = humantime::parse_duration, env = "SPEEDWATCH_PROBE_DURATION")]
    probe_duration: Option<Duration>,

    /// Metric name prefix
    #[arg(long, env = "SPEEDWATCH_NAMESPACE")]
    namespace: Option<String>,

    /// What to do when a speed test or report fails
    #[arg(long, value_enum, default_value_t = FailurePolicy::Exit, env = "SPEEDWATCH_ON_FAILURE")]
    on_failure: FailurePolicy,
}

impl Cli {
    /// CLI and env values take precedence over the config file.
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(address) = &self.statsd_address {
            settings.statsd_address = address.clone();
        }
        if let Some(label) = &self.network_label {
            settings.network_label = label.clone();
        }
        if let Some(poll) = self.poll {
            settings.poll_interval = poll;
        }
        if let Some(duration) = self.probe_duration {
            settings.probe_duration = duration;
        }
        if let Some(namespace) = &self.namespace {
            settings.namespace = namespace.clone();
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match Settings::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config))?
    {
        Some(settings) => {
            info!("Reading config from {}", cli.config);
            settings
        }
        None => {
            info!("Using default configuration");
            Settings::default()
        }
    };

    cli.apply_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,speedwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = load_settings(&cli)?;
    info!("Config: {:?}", settings);

    let backend = HttpBackend::new(settings.probe_duration, &settings.catalog_url)?;
    let server = resolve_server(
        &backend,
        &settings.server_blacklist,
        settings.max_candidates,
    )
    .await?;

    let sink = StatsdSink::connect(&settings.statsd_address, &settings.namespace)
        .with_context(|| format!("failed to connect to statsd at {}", settings.statsd_address))?;
    let reporter = MetricsReporter::new(sink, &server, &settings.network_label);
    let client = ProbeClient::new(backend, server, settings.probe_duration);

    info!("Monitoring network {}", settings.network_label);
    info!(
        "Polling server {} in {} every {}.",
        client.host(),
        client.location(),
        humantime::format_duration(settings.poll_interval)
    );
    info!(tags = ?reporter.tags(), "reporting to statsd at {}", settings.statsd_address);

    let agent = Agent::new(client, reporter, cli.on_failure);
    agent.run(&Scheduler::new(settings.poll_interval)).await
}
