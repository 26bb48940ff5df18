// Example of exporting process metrics to Graphite using graphite-report

use anyhow::Result;
use clap::Parser;
use graphite_report::bootstrap::with_graphite_from_config;
use graphite_report::config::{ConfigSettings, ConfigSource, LogLevel};
use graphite_report::handler::LogErrorHandler;
use graphite_report::report::MetricsReports;
use graphite_report::sample::{MetricSample, sample_channel};
use graphite_report::util::logging;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Command line arguments for the export example
#[derive(Parser, Debug)]
#[command(name = "export", about = "graphite-report export example")]
struct Args {
    /// Path to a TOML file with a [metrics.graphite] table
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// How often to record samples, in milliseconds
    #[arg(short, long, default_value = "1000")]
    sample_every_ms: u64,
}

fn metric_prefix() -> String {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().replace('.', "_"))
        .unwrap_or_else(|_| "unknown".to_string());
    format!("servers.{}.graphite_report", host)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level: LogLevel = args.log_level.parse()?;
    logging::init(&level);

    let settings = ConfigSettings::load(vec![
        ConfigSource::File(args.config.clone()),
        ConfigSource::Environment("APP".to_string()),
    ])?;

    let (recorder, source) = sample_channel(10_000);
    let reports = MetricsReports::new()?;

    let binding = with_graphite_from_config(&reports, &settings, Arc::new(source), &LogErrorHandler);
    match &binding {
        Some(binding) => info!("Exporting to {} every {:?}", binding.target(), binding.interval()),
        None => error!("Graphite export is not configured; samples will be discarded"),
    }

    let prefix = metric_prefix();
    let started = Instant::now();
    let sample_every = Duration::from_millis(args.sample_every_ms.max(1));
    let sampler = tokio::spawn(async move {
        let mut ticks: u64 = 0;
        let mut timer = tokio::time::interval(sample_every);
        loop {
            timer.tick().await;
            ticks += 1;
            recorder.record(MetricSample::now(
                format!("{}.uptime_seconds", prefix),
                started.elapsed().as_secs_f64(),
            ));
            recorder.record(MetricSample::now(format!("{}.samples", prefix), ticks as f64));
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    sampler.abort();
    reports.shutdown(Duration::from_secs(5)).await;

    Ok(())
}
