//! Energy Storage Site Evaluation CLI
//!
//! Scores candidate sites described by a JSON run configuration.
//!
//! Usage:
//!   evaluate-sites --config runs/puerto_rico.json \
//!                  --output results/puerto_rico_scores.json

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, ValueEnum};
use road_network::OsrmClient;
use site_evaluator::config::{ModelConfig, RunConfig};
use site_evaluator::output::ResultDocument;
use site_evaluator::{evaluate, DistanceMethod, GeodesicGeometry, Services, TracingSink};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DistanceArg {
    Road,
    Haversine,
}

impl From<DistanceArg> for DistanceMethod {
    fn from(arg: DistanceArg) -> Self {
        match arg {
            DistanceArg::Road => DistanceMethod::Road,
            DistanceArg::Haversine => DistanceMethod::StraightLine,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "evaluate-sites",
    about = "Score candidate sites for static or mobile energy storage"
)]
struct Args {
    /// Path to the JSON run configuration
    #[arg(short, long)]
    config: PathBuf,

    /// Output JSON file
    #[arg(short, long, default_value = "evaluation_results.json")]
    output: PathBuf,

    /// OSRM base URL, overriding the configuration
    #[arg(long, env = "OSRM_URL")]
    osrm_url: Option<String>,

    /// Distance method for the static model, overriding the configuration
    #[arg(long, value_enum)]
    distance_method: Option<DistanceArg>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG takes precedence over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("{}", "=".repeat(60));
    info!("Energy Storage Site Evaluator");
    info!("{}", "=".repeat(60));

    let mut config = RunConfig::from_file(&args.config)
        .with_context(|| format!("reading {:?}", args.config))?;

    if let Some(url) = args.osrm_url {
        config.routing.base_url = url;
    }
    if let Some(method) = args.distance_method {
        match &mut config.model {
            ModelConfig::Static {
                distance_method, ..
            } => *distance_method = method.into(),
            ModelConfig::Mobile { .. } => {
                warn!("--distance-method applies to the static model only; ignored")
            }
        }
    }

    info!("Mode: {}", config.model.model());
    info!("Routing backend: {}", config.routing.base_url);

    let inputs = config.load_inputs()?;
    let geometry = config
        .buffer_segments
        .map(GeodesicGeometry::new)
        .unwrap_or_default();
    let routing = OsrmClient::new(config.routing.clone())?;
    let sink = TracingSink;

    let services = Services {
        geometry: &geometry,
        routing: &routing,
        sink: &sink,
        cancel: None,
    };
    let report = evaluate(&inputs, &services)?;

    // Show top 10 by final score
    info!("\nTop 10 candidates by final score:");
    for c in report.ranked().iter().take(10) {
        let totals = c.totals().copied().unwrap_or_default();
        info!(
            "  {:8.3} | {:30} | infra={:.3} census={:.3} zones={:+.1}",
            totals.final_score,
            &c.name.chars().take(30).collect::<String>(),
            totals.infrastructure,
            totals.census,
            totals.zones
        );
    }

    // Write output
    info!("\nWriting output to {:?}", args.output);
    let document = ResultDocument::from_report(&report, Utc::now());
    let file = File::create(&args.output)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &document)?;

    // Summary
    info!("\n{}", "=".repeat(60));
    info!("SUMMARY");
    info!("{}", "=".repeat(60));
    info!("Candidates scored: {} of {}", report.candidates.len(), report.input_count);
    if report.skipped > 0 {
        info!("Skipped during setup: {}", report.skipped);
    }
    if report.score_failures > 0 {
        warn!("Final score forced to 0: {}", report.score_failures);
    }
    if let Some(savings) = report
        .candidates
        .iter()
        .filter_map(|c| c.totals().and_then(|t| t.outage_cost_savings))
        .reduce(f64::max)
    {
        info!("Largest outage cost savings: {:.2}", savings);
    }

    Ok(())
}
