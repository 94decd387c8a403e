use anyhow::Context;
use chrono::Utc;
use correlation_graph::data::YahooPriceSource;
use correlation_graph::output::GraphWriter;
use correlation_graph::{CorrelationPipeline, PipelineConfig, PipelineReport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Prints a short summary of a finished run.
///
/// # Arguments
/// * `report`: Stage statistics of the run
/// * `written`: Locations the graph document was written to
fn print_summary(report: &PipelineReport, written: &[PathBuf]) {
    println!("\nCorrelation Graph:");
    println!("Price Field: {}", report.field);
    println!("Assets Requested: {}", report.assets_in);
    if !report.dropped.is_empty() {
        println!("Dropped (no data): {}", report.dropped.join(", "));
    }
    println!("Nodes: {}", report.nodes);
    println!("Links: {}", report.links);
    for path in written {
        println!("Wrote {}", path.display());
    }
}

/// Fetches the configured price window, builds the correlation graph and
/// writes it to the configured locations.
///
/// Nothing is written unless the whole pipeline succeeds.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        assets = config.assets.len(),
        sectors = config.taxonomy.len(),
        threshold = config.threshold,
        lookback_days = config.lookback_days,
        "Loaded configuration"
    );

    let source = YahooPriceSource::new().context("Failed to create price source")?;
    let writer = GraphWriter::new(config.output_path.clone(), config.snapshot_path.clone());
    let pipeline = CorrelationPipeline::new(config);

    let output = pipeline
        .run_with_source(&source, Utc::now())
        .await
        .context("Correlation pipeline failed, no output written")?;

    let written = writer
        .write(&output.graph)
        .context("Failed to write correlation graph")?;

    print_summary(&output.report, &written);

    Ok(())
}
