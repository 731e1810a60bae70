use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use wta_trace::domain::correlation::TraceSnapshot;
use wta_trace::domain::resource::{ResourceRegistry, ResourceServer};
use wta_trace::domain::runtime_config::RuntimeConfig;
use wta_trace::domain::sampler::{LoadAverageProbe, MemInfoProbe, MetricProbe, MetricSampler};
use wta_trace::domain::writer::{FileTraceWriter, TraceWriter};
use wta_trace::{logger, replay_event_log};

#[derive(Debug, Parser)]
#[command(name = "wta-trace", about = "Builds workload traces from scheduler events and host samples")]
struct Cli {
    /// JSON runtime configuration; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured output directory.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replays a recorded scheduler event log and writes the resulting trace.
    Replay {
        #[arg(long)]
        events: PathBuf,
    },
    /// Samples this host and receives samples from remote reporters for a fixed duration.
    Collect {
        #[arg(long, default_value = "127.0.0.1:7070")]
        listen: SocketAddr,

        #[arg(long, default_value_t = 60)]
        duration_secs: u64,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<RuntimeConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_str().context("configuration path is not valid UTF-8")?;
            RuntimeConfig::load(path).with_context(|| format!("failed to load configuration from '{}'", path))?
        }
        None => RuntimeConfig::default(),
    };
    if let Some(output) = &cli.output {
        config.output_path = output.clone();
    }
    Ok(config)
}

async fn collect(config: Arc<RuntimeConfig>, listen: SocketAddr, duration: Duration) -> anyhow::Result<TraceSnapshot> {
    let registry = Arc::new(ResourceRegistry::from_config(&config));
    let cancel = CancellationToken::new();

    let server = ResourceServer::bind(listen, Arc::clone(&registry)).await.with_context(|| format!("failed to listen on {}", listen))?;
    let server_task = tokio::spawn(server.serve(cancel.clone()));

    let probes: Vec<Arc<dyn MetricProbe>> = vec![Arc::new(LoadAverageProbe::new()), Arc::new(MemInfoProbe::new())];
    let sampler = MetricSampler::new("driver", probes, registry.buffer_for("driver")).with_probe_timeout(config.probe_timeout);
    sampler.start_pinging(config.resource_ping_interval);

    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => log::info!("Interrupted, stopping collection."),
    }

    sampler.stop_pinging();
    cancel.cancel();
    server_task.await.context("resource receiver panicked")??;

    Ok(TraceSnapshot { resources: registry.collect(), ..Default::default() })
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(load_config(&cli)?);
    logger::init(config.log_level, Path::new("logs"));

    let snapshot = match &cli.command {
        Command::Replay { events } => {
            let events = events.to_str().context("event log path is not valid UTF-8")?;
            replay_event_log(events, Arc::clone(&config)).with_context(|| format!("failed to replay '{}'", events))?
        }
        Command::Collect { listen, duration_secs } => {
            let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
            runtime.block_on(collect(Arc::clone(&config), *listen, Duration::from_secs(*duration_secs)))?
        }
    };

    FileTraceWriter::new(Arc::clone(&config)).write(&snapshot).context("failed to write trace")?;
    Ok(())
}
