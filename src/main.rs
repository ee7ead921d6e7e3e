use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use trip_quarantine::app::ports::{AcceptedSinkPort, QuarantineSinkPort};
use trip_quarantine::app::{PartitionReport, PartitionValidationUseCase};
use trip_quarantine::config::{Config, WriteMode};
use trip_quarantine::infra::in_memory::{InMemoryAcceptedSink, InMemoryQuarantineSink};
use trip_quarantine::infra::{FileAcceptedOutputAdapter, FileQuarantineOutputAdapter, NdjsonBatchSource};
use trip_quarantine::logging;
use trip_quarantine::metrics::{self, MetricsSink, PrometheusMetricsSink, METRICS_ADDR_ENV_VAR};
use trip_quarantine::pipeline::{Pipeline, QuarantineStatus, QuarantineWriter, RuleEngine, RunSummary};

#[derive(Parser)]
#[command(name = "trip_quarantine")]
#[command(about = "Validate taxi trip partitions and quarantine rejected records")]
#[command(version = "0.1.0")]
struct Cli {
    /// Config file (defaults to $TRIP_QUARANTINE_CONFIG, then ./trip_quarantine.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the rolling JSON log
    #[arg(long, global = true, default_value = logging::DEFAULT_LOG_DIR)]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one or more partitions, each as its own run
    Run {
        /// Partition files or directories of NDJSON part files
        #[arg(required = true)]
        partitions: Vec<String>,
        /// Override storage.accepted_root
        #[arg(long)]
        accepted_root: Option<PathBuf>,
        /// Override storage.quarantine_root
        #[arg(long)]
        quarantine_root: Option<PathBuf>,
        /// Replace an existing quarantine partition instead of failing
        #[arg(long)]
        overwrite_quarantine: bool,
        /// Validate without writing anything to disk
        #[arg(long)]
        dry_run: bool,
        /// Write all run summaries to this JSON file
        #[arg(long)]
        summary_out: Option<PathBuf>,
        /// Serve Prometheus metrics on this address while running
        #[arg(long)]
        metrics_addr: Option<SocketAddr>,
        /// Print a Prometheus snapshot when done
        #[arg(long)]
        print_metrics: bool,
    },
    /// Print the effective rule catalog
    Rules,
    /// Load and validate the configuration, then exit
    CheckConfig,
}

fn metrics_addr_from_env() -> Option<SocketAddr> {
    let raw = std::env::var(METRICS_ADDR_ENV_VAR).ok()?;
    match raw.parse() {
        Ok(addr) => Some(addr),
        Err(e) => {
            warn!("Ignoring {}={}: {}", METRICS_ADDR_ENV_VAR, raw, e);
            None
        }
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Run {} ({})", summary.run_id, summary.source);
    println!("   Processed: {}", summary.processed);
    println!("   Passed: {} ({:.1}%)", summary.passed, summary.pass_rate());
    println!("   Rejected: {}", summary.rejected);
    for (rule, count) in &summary.rejected_by_rule {
        println!("     - {}: {}", rule, count);
    }
    if !summary.skipped_rules.is_empty() {
        println!("   Skipped rules: {}", summary.skipped_rules.join(", "));
    }
    if let (Some(min), Some(max)) = (summary.min_event_time, summary.max_event_time) {
        println!("   Event time: {} .. {}", min, max);
    }
    println!("   Accepted output: {}", summary.accepted_location);
    match &summary.quarantine {
        QuarantineStatus::NotRequired => println!("   Quarantine: not required"),
        QuarantineStatus::Written { location, records } => {
            println!("   Quarantine: {} records at {}", records, location)
        }
        QuarantineStatus::Failed { error } => {
            println!("   ⚠️  Quarantine write FAILED, rejected records were not persisted: {}", error)
        }
    }
}

fn write_summaries(report: &PartitionReport, summary_out: Option<&Path>, summary_dir: Option<&Path>) -> anyhow::Result<()> {
    let summaries: Vec<&RunSummary> = report
        .runs
        .iter()
        .filter_map(|run| run.result.as_ref().ok())
        .map(|outcome| &outcome.summary)
        .collect();

    if let Some(path) = summary_out {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&summaries)?)
            .with_context(|| format!("writing {}", path.display()))?;
        info!("Run summaries written to {}", path.display());
    }

    if let Some(dir) = summary_dir {
        std::fs::create_dir_all(dir)?;
        for summary in &summaries {
            let path = dir.join(format!("{}.json", summary.run_id));
            std::fs::write(&path, serde_json::to_vec_pretty(summary)?)
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    logging::init_logging(&cli.log_dir);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::CheckConfig => {
            let engine = RuleEngine::from_config(&config.rules)?;
            println!("✅ Configuration is valid ({} rules)", engine.rules().len());
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Rules => {
            let engine = RuleEngine::from_config(&config.rules)?;
            println!("📋 Rules, in evaluation order:");
            for (index, rule) in engine.rules().iter().enumerate() {
                println!("   {}. {}", index + 1, rule);
            }
        }
        Commands::Run {
            partitions,
            accepted_root,
            quarantine_root,
            overwrite_quarantine,
            dry_run,
            summary_out,
            metrics_addr,
            print_metrics,
        } => {
            let engine = RuleEngine::from_config(&config.rules)?;

            metrics::init_metrics(metrics_addr.or_else(metrics_addr_from_env));
            let metrics_sink: Arc<dyn MetricsSink> = Arc::new(PrometheusMetricsSink);

            let mode = if overwrite_quarantine {
                WriteMode::Overwrite
            } else {
                config.storage.quarantine_write_mode
            };

            let (accepted_sink, quarantine_sink): (Arc<dyn AcceptedSinkPort>, Arc<dyn QuarantineSinkPort>) = if dry_run {
                println!("🧪 Dry run: nothing will be written");
                (Arc::new(InMemoryAcceptedSink::new()), Arc::new(InMemoryQuarantineSink::new()))
            } else {
                (
                    Arc::new(FileAcceptedOutputAdapter::new(
                        accepted_root.unwrap_or_else(|| config.storage.accepted_root.clone()),
                    )),
                    Arc::new(FileQuarantineOutputAdapter::new(
                        quarantine_root.unwrap_or_else(|| config.storage.quarantine_root.clone()),
                    )),
                )
            };

            let pipeline = Pipeline::new(engine, QuarantineWriter::new(quarantine_sink, mode), accepted_sink);
            let use_case = PartitionValidationUseCase::new(
                Arc::new(NdjsonBatchSource::new()),
                Arc::new(pipeline),
                metrics_sink,
                config.pipeline.max_parallel_partitions,
            );

            println!("🚀 Validating {} partition(s)...", partitions.len());
            let report = use_case.run_partitions(&partitions).await;

            for run in &report.runs {
                match &run.result {
                    Ok(outcome) => print_summary(&outcome.summary),
                    Err(e) => {
                        error!(partition = %run.path, "Run failed: {}", e);
                        println!("\n❌ {}: {}", run.path, e);
                    }
                }
            }

            println!(
                "\n✅ {} succeeded, {} failed, {} rejected in total",
                report.succeeded(),
                report.failed(),
                report.metrics.total_rejected()
            );

            let summary_dir = if dry_run { None } else { config.storage.summary_dir.as_deref() };
            write_summaries(&report, summary_out.as_deref(), summary_dir)?;

            if print_metrics {
                if let Some(snapshot) = metrics::render() {
                    println!("\n{}", snapshot);
                }
            }

            if report.failed() > 0 {
                bail!("{} of {} partitions failed", report.failed(), report.runs.len());
            }
        }
    }
    Ok(())
}
