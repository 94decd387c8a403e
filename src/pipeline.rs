use crate::analysis::{CorrelationGraph, CorrelationMatrixBuilder, GraphAssembler};
use crate::config::{lookback_window, PipelineConfig};
use crate::data::{DataNormalizer, FieldSelection, PriceSource, RawPriceTable, ReturnsCalculator};
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

/// Summary of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub field: FieldSelection,
    /// Assets present in the raw price table.
    pub assets_in: usize,
    /// Assets removed because they had no observed price.
    pub dropped: Vec<String>,
    /// Assets excluded for having fewer than two returns.
    pub too_sparse: usize,
    pub undefined_pairs: usize,
    pub nodes: usize,
    pub links: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub graph: CorrelationGraph,
    pub report: PipelineReport,
}

/// Raw prices -> cleaned prices -> returns -> correlation matrix -> graph.
pub struct CorrelationPipeline {
    config: PipelineConfig,
    normalizer: DataNormalizer,
    returns: ReturnsCalculator,
    correlations: CorrelationMatrixBuilder,
    assembler: GraphAssembler,
}

impl CorrelationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let assembler = GraphAssembler::from_config(&config);
        Self {
            config,
            normalizer: DataNormalizer::new(),
            returns: ReturnsCalculator::new(),
            correlations: CorrelationMatrixBuilder::new(),
            assembler,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage over an already fetched price table.
    ///
    /// # Errors
    /// Fails only if no asset in `raw` has a single observed price.
    pub fn run(&self, raw: RawPriceTable) -> Result<PipelineOutput> {
        let assets_in = raw
            .fields()
            .first()
            .map(|(_, table)| table.len())
            .unwrap_or(0);

        let normalized = self.normalizer.normalize(raw)?;
        let returns = self.returns.calculate(&normalized.table);
        let matrix = self.correlations.build(&returns);
        let graph = self.assembler.assemble(&matrix);

        let report = PipelineReport {
            field: normalized.selection,
            assets_in,
            dropped: normalized.dropped,
            too_sparse: returns.len() - matrix.len(),
            undefined_pairs: matrix.pairs().filter(|(_, _, c)| c.is_none()).count(),
            nodes: graph.nodes.len(),
            links: graph.links.len(),
        };
        info!(
            field = %report.field,
            assets_in = report.assets_in,
            dropped = report.dropped.len(),
            too_sparse = report.too_sparse,
            undefined_pairs = report.undefined_pairs,
            nodes = report.nodes,
            links = report.links,
            "Correlation pipeline finished"
        );

        Ok(PipelineOutput { graph, report })
    }

    /// Fetches the configured lookback window ending at `end`, then runs.
    ///
    /// # Errors
    /// Propagates fetch failures; see [`CorrelationPipeline::run`] for the
    /// rest.
    pub async fn run_with_source(
        &self,
        source: &dyn PriceSource,
        end: DateTime<Utc>,
    ) -> Result<PipelineOutput> {
        let start = end
            .checked_sub_signed(lookback_window(self.config.lookback_days)?)
            .ok_or_else(|| {
                PipelineError::Config(format!(
                    "lookback of {} days before {} is out of range",
                    self.config.lookback_days, end
                ))
            })?;
        let raw = source
            .fetch(&self.config.assets, start, end, &self.config.interval)
            .await?;
        self.run(raw)
    }
}
