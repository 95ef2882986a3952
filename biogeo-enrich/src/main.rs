//! biogeo-enrich - Biosample geo-validation and enrichment CLI
//!
//! Reads a JSON array of sample records, runs the enrichment pipeline
//! against the configured external services, and writes a full report
//! (every record in a terminal state) plus an aggregate summary.

use anyhow::{Context, Result};
use biogeo_enrich::config::EnrichConfig;
use biogeo_enrich::workflow::{parse_input, PipelineOrchestrator};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "biogeo-enrich", version, about = "Geo-validation and environmental enrichment for biosample records")]
struct Args {
    /// Input JSON file (array of sample records)
    #[arg(short, long)]
    input: PathBuf,

    /// Output report path; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the batch summary separately to this path
    #[arg(long)]
    summary_output: Option<PathBuf>,

    /// Config file path (TOML); falls back to BIOGEO_ENRICH_CONFIG, then
    /// the per-user config directory
    #[arg(short, long)]
    config: Option<String>,

    /// Override: feature search radius in meters
    #[arg(long)]
    radius: Option<f64>,

    /// Override: maximum asserted-vs-inferred distance in km
    #[arg(long)]
    max_distance: Option<f64>,

    /// Override: minimum annotation confidence
    #[arg(long)]
    confidence: Option<f64>,

    /// Override: worker pool size
    #[arg(long)]
    workers: Option<usize>,

    /// Process at most this many records from the input
    #[arg(long)]
    max_samples: Option<usize>,

    /// Override: lexical index snapshot path
    #[arg(long)]
    lexicon: Option<PathBuf>,
}

fn load_config(args: &Args) -> Result<EnrichConfig> {
    let path = biogeo_common::config::resolve_config_path(
        args.config.as_deref(),
        "BIOGEO_ENRICH_CONFIG",
        "biogeo-enrich",
    );

    let mut config: EnrichConfig = match path {
        Some(path) => {
            info!("Config: {}", path.display());
            biogeo_common::config::load_toml(&path)?
        }
        None => {
            info!("No config file found, using defaults");
            EnrichConfig::default()
        }
    };

    if let Some(radius) = args.radius {
        config.radius_m = radius;
    }
    if let Some(max_distance) = args.max_distance {
        config.max_distance_km = max_distance;
    }
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(lexicon) = &args.lexicon {
        config.lexical_index_path = Some(lexicon.clone());
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!("Starting biogeo-enrich");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;

    let json = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading input {}", args.input.display()))?;
    let mut records = parse_input(&json)?;
    if let Some(max) = args.max_samples {
        records.truncate(max);
    }
    info!("Loaded {} records from {}", records.len(), args.input.display());

    let orchestrator = PipelineOrchestrator::from_config(config)?;
    let report = orchestrator.run(records).await;

    let report_json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, report_json)
                .with_context(|| format!("writing report {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", report_json),
    }

    if let Some(path) = &args.summary_output {
        let summary_json = serde_json::to_string_pretty(&report.summary)?;
        std::fs::write(path, summary_json)
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    Ok(())
}
