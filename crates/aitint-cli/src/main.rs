//! aitint command-line tool
//!
//! Reads text units extracted from a document (JSON), scores them for
//! machine-generated text with a local language model, and writes a JSON
//! overlay document with one colored rectangle per scored segment.
//!
//! Usage:
//!   aitint units.json overlays.json
//!   aitint units.json overlays.json --detector curvature --samples 50
//!   AITINT_CONFIG=aitint.yaml aitint units.json overlays.json --create-legend

mod cli;
mod config;

use std::path::Path;
use std::sync::Arc;

use aitint_core::{AitintConfig, LoggingConfig, TextUnit};
use aitint_detect::{Detector, DocumentOverlay, ScoringPipeline};
use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => AitintConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;

    init_tracing(&config.logging)?;
    if let Some(path) = &cli.config {
        info!(path = %path.display(), "Loaded configuration from file");
    }

    let units = read_units(&cli.input)?;
    info!(
        input = %cli.input.display(),
        units = units.len(),
        detector = %config.detector.kind,
        model_id = %config.detector.model_id,
        "Scoring document"
    );

    let detector = Detector::load(&config.detector)
        .await
        .context("Failed to load language model")?;
    let pipeline = ScoringPipeline::new(Arc::new(detector), &config)?;
    let overlay = pipeline.run(&units).await?;

    write_overlay(&cli.output, &overlay)?;

    if let Some(stats) = pipeline.latency_stats() {
        info!(
            segments = stats.count,
            p50_ms = stats.p50.as_millis() as u64,
            p95_ms = stats.p95.as_millis() as u64,
            max_ms = stats.max.as_millis() as u64,
            "Segment scoring latency"
        );
    }
    info!(
        output = %cli.output.display(),
        overlays = overlay.overlays().count(),
        "Wrote overlay document"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .with_context(|| format!("Invalid log level: {}", logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        "text" => builder.init(),
        other => anyhow::bail!("Unknown log format: {other} (expected text or json)"),
    }
    Ok(())
}

fn read_units(path: &Path) -> anyhow::Result<Vec<TextUnit>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file {}", path.display()))?;
    let units: Vec<TextUnit> = serde_json::from_str(&contents)
        .with_context(|| format!("Invalid text units in {}", path.display()))?;
    Ok(units)
}

fn write_overlay(path: &Path, overlay: &DocumentOverlay) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(overlay)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write output file {}", path.display()))?;
    Ok(())
}
