//! Promise Padding Forecast CLI
//!
//! Forecasts padding distributions for every shipping node in a shipment
//! extract and writes them as a JSON report for the pad optimizer.
//!
//! Usage:
//!   forecast-pads --config config/forecast.json \
//!                 --shipments data/shipments.csv \
//!                 --output data/pad_forecast.json

use anyhow::{Context, Result};
use clap::Parser;
use fulfillment_nodes::DateParser;
use pad_forecast::{loader, report::ForecastReport, ForecastConfig, ForecastPipeline};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(
    name = "forecast-pads",
    about = "Forecast promise padding distributions per shipping node"
)]
struct Args {
    /// Forecast config JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shipment extract (.json or .csv)
    #[arg(short, long)]
    shipments: PathBuf,

    /// Output JSON report
    #[arg(short, long, default_value = "pad_forecast.json")]
    output: PathBuf,

    /// Also write the per-node metrics table as CSV
    #[arg(long)]
    metrics_csv: Option<PathBuf>,

    /// Override the sparsity threshold
    #[arg(long)]
    sparsity_threshold: Option<usize>,

    /// Override the decay rate
    #[arg(long)]
    lambda_decay: Option<f64>,

    /// Override the recent window anchor date
    #[arg(long)]
    anchor_date: Option<String>,

    /// Override the recent window length in days
    #[arg(long)]
    window_days: Option<i64>,

    /// Override the quantile levels (comma separated)
    #[arg(long, value_delimiter = ',')]
    quantiles: Option<Vec<f64>>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn apply_overrides(&self, config: &mut ForecastConfig) {
        if let Some(threshold) = self.sparsity_threshold {
            config.sparsity_threshold = threshold;
        }
        if let Some(lambda) = self.lambda_decay {
            config.lambda_decay = lambda;
        }
        if let Some(anchor) = &self.anchor_date {
            config.recent_window_anchor_date = Some(anchor.clone());
        }
        if let Some(days) = self.window_days {
            config.recent_window_days = days;
        }
        if let Some(levels) = &self.quantiles {
            config.quantile_levels = Some(levels.clone());
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging, RUST_LOG wins when set
    let level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("Promise Padding Forecaster");
    info!("{}", "=".repeat(60));

    let mut config = match &args.config {
        Some(path) => ForecastConfig::from_path(path)
            .with_context(|| format!("reading config {:?}", path))?,
        None => ForecastConfig::default(),
    };
    args.apply_overrides(&mut config);

    let mut parser = DateParser::new();
    let resolved = config.resolve(&mut parser)?;
    info!(
        "Anchor {} ({} day window), threshold {}, lambda {}, {} quantile levels",
        resolved.anchor_date,
        resolved.window_days,
        resolved.sparsity_threshold,
        resolved.lambda_decay,
        resolved.quantile_levels.len()
    );

    let (mut aggregator, summary) = loader::load_shipments(&args.shipments, &mut parser)
        .with_context(|| format!("loading shipments from {:?}", args.shipments))?;

    let pipeline = ForecastPipeline::new(resolved);
    let outcome = pipeline.run(&mut aggregator)?;

    let report = ForecastReport::build(&aggregator, &outcome, pipeline.config(), &summary);
    report.write_json(&args.output)?;
    if let Some(path) = &args.metrics_csv {
        report.write_metrics_csv(path)?;
    }

    info!("{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Shipments: {} loaded, {} skipped", summary.loaded, summary.skipped);
    info!("Nodes: {}", report.metadata.total_nodes);
    info!("  dense: {}", report.metadata.dense_nodes);
    info!("  sparse: {}", report.metadata.sparse_nodes);
    info!(
        "Forecasts: {} observed, {} extrapolated, {} missing",
        report.metadata.observed_forecasts,
        report.metadata.extrapolated_forecasts,
        report.metadata.unforecast_nodes
    );

    Ok(())
}
