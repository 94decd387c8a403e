//! Correlation graph construction from daily asset price histories.
//!
//! Raw prices are normalized, turned into simple returns, correlated
//! pairwise and assembled into a node/link graph for network visualizations.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod output;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::{CorrelationPipeline, PipelineOutput, PipelineReport};
