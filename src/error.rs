use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a pipeline run.
///
/// Only conditions that leave the run with nothing meaningful to publish are
/// represented here. Asset-level drops and undefined pair correlations are
/// handled inside the stage that detects them and never surface as errors.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The market-data source was unreachable or returned nothing usable.
    #[error("Failed to fetch price data: {0}")]
    Fetch(String),
    /// Every asset was dropped during normalization.
    #[error("No asset in the price table has any observed price")]
    NoUsableData,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize graph: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
