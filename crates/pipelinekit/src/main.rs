//! Demo/reference binary wiring the pooling, back-pressure, safety, and
//! metrics-export subsystems together.
//!
//! Not meant to be the only way to use this crate — library users embed the
//! `pipelinekit-*` crates directly. This binary exists so the wiring has one
//! runnable, observable example, the way `enginectl` exercises `otap-dataflow`.

use clap::Parser;
use pipelinekit::backpressure::Semaphore;
use pipelinekit::config::{BackpressureStrategy, Priority};
use pipelinekit::export::backends::{ConsoleExporter, ConsoleFormat};
use pipelinekit::export::{AggregationConfig, AggregationWrapper, Exporter};
use pipelinekit::metrics::{MetricKind, MetricSample};
use pipelinekit::pool::Pool;
use pipelinekit::safety::{Limits, MonitorConfig, SafetyMonitor};
use pipelinekit::ResourceKind;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "pipelinekitd", about = "PipelineKit demo worker")]
struct Args {
    /// Maximum number of permits handed out by the admission semaphore.
    #[arg(long, default_value_t = 8)]
    max_concurrency: usize,

    /// Maximum outstanding (held + queued) admission requests.
    #[arg(long, default_value_t = 64)]
    max_outstanding: usize,

    /// Number of synthetic jobs to run before exiting.
    #[arg(long, default_value_t = 20)]
    jobs: usize,

    /// Size of the pre-warmed buffer pool.
    #[arg(long, default_value_t = 4)]
    pool_size: usize,

    /// How long each job waits for an admission slot before giving up.
    #[arg(long, default_value = "5s")]
    acquire_timeout: humantime::Duration,

    /// Print the final pool/semaphore statistics as JSON instead of a log line.
    #[arg(long)]
    stats_json: bool,
}

/// A pooled scratch buffer reused by each synthetic job.
struct Buffer(Vec<u8>);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let pool: Pool<Buffer> = Pool::new(args.pool_size, || Buffer(Vec::with_capacity(4096)));
    pool.warm_up(args.pool_size);

    let semaphore = Semaphore::new(
        args.max_concurrency,
        args.max_outstanding,
        BackpressureStrategy::Suspend,
        None,
    );

    let monitor = SafetyMonitor::new(Limits::default(), MonitorConfig::default());

    let console = Arc::new(ConsoleExporter::new(ConsoleFormat::Compact, Some("pipelinekit".to_string())));
    let exporter = Arc::new(AggregationWrapper::new(console, AggregationConfig::default()));

    tracing::info!(jobs = args.jobs, max_concurrency = args.max_concurrency, "starting demo run");

    for job_id in 0..args.jobs {
        let token = semaphore
            .acquire(Priority::Normal, 1, Some(args.acquire_timeout.into()))
            .await?;
        let Some(token) = token else {
            tracing::warn!(job_id, "timed out waiting for an admission slot");
            continue;
        };

        let reservation = monitor.reserve(ResourceKind::Task, 1)?;
        let handle = monitor.confirm(reservation)?;

        let buffer = pool.acquire_pooled();
        tracing::debug!(job_id, buffer_capacity = buffer.0.capacity(), "acquired pooled buffer");

        let sample = MetricSample::new("pipelinekit.jobs.completed", MetricKind::Counter, 1.0)
            .with_tag("job_id", job_id.to_string());
        exporter.export(&sample).await?;

        drop(handle);
        drop(token);
    }

    exporter.flush().await?;
    exporter.shutdown().await?;

    let report = monitor.check_consistency(false);
    if !report.is_consistent() {
        tracing::warn!(mismatches = report.mismatches.len(), "resource accounting drifted during the run");
    }

    if args.stats_json {
        let summary = serde_json::json!({
            "pool": {
                "currently_available": pool.statistics().currently_available,
                "currently_in_use": pool.statistics().currently_in_use,
                "total_allocated": pool.statistics().total_allocated,
            },
            "semaphore": {
                "in_use": semaphore.stats().in_use,
                "available": semaphore.stats().available,
                "queued": semaphore.stats().queued,
            },
            "consistent": report.is_consistent(),
        });
        println!("{summary}");
    } else {
        tracing::info!(pool_stats = ?pool.statistics(), semaphore_stats = ?semaphore.stats(), "demo run complete");
    }
    Ok(())
}
