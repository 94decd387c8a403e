use super::correlation::CorrelationMatrix;
use crate::config::{DisplayFormat, PipelineConfig, SectorTaxonomy};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// An asset in the rendered graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub group: String,
}

/// A thresholded correlation between two assets.
///
/// `value` is the correlation rounded to two decimals; `is_positive` is the
/// sign of the unrounded correlation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub value: f64,
    #[serde(rename = "isPositive")]
    pub is_positive: bool,
}

/// The document handed to visualization front-ends.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CorrelationGraph {
    pub nodes: Vec<GraphNode>,
    pub links: Vec<GraphEdge>,
}

/// Rounds half away from zero to two decimal places.
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Turns a correlation matrix into nodes and thresholded edges.
#[derive(Debug, Clone)]
pub struct GraphAssembler {
    taxonomy: SectorTaxonomy,
    display: DisplayFormat,
    threshold: f64,
}

impl GraphAssembler {
    pub fn new(taxonomy: SectorTaxonomy, display: DisplayFormat, threshold: f64) -> Self {
        Self {
            taxonomy,
            display,
            threshold,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.taxonomy.clone(),
            config.display.clone(),
            config.threshold,
        )
    }

    /// Builds the graph.
    ///
    /// Nodes follow the matrix asset order. Edges are emitted for pairs
    /// `(i, j)` with `i < j` in that same order, skipping undefined
    /// correlations and anything whose magnitude is not strictly above the
    /// threshold.
    pub fn assemble(&self, matrix: &CorrelationMatrix) -> CorrelationGraph {
        let ids = self.node_ids(matrix.assets());

        let nodes: Vec<GraphNode> = matrix
            .assets()
            .iter()
            .zip(&ids)
            .filter_map(|(asset, id)| {
                id.as_ref().map(|id| GraphNode {
                    id: id.clone(),
                    group: self.taxonomy.group_of(asset).to_string(),
                })
            })
            .collect();

        let mut undefined = 0usize;
        let mut links = Vec::new();
        for (i, j, correlation) in matrix.pairs() {
            let (Some(source), Some(target)) = (&ids[i], &ids[j]) else {
                continue;
            };
            let Some(correlation) = correlation else {
                undefined += 1;
                continue;
            };
            if correlation.abs() <= self.threshold {
                continue;
            }
            links.push(GraphEdge {
                source: source.clone(),
                target: target.clone(),
                value: round_to_cents(correlation),
                is_positive: correlation > 0.0,
            });
        }

        info!(
            nodes = nodes.len(),
            links = links.len(),
            undefined,
            threshold = self.threshold,
            "Assembled correlation graph"
        );

        CorrelationGraph { nodes, links }
    }

    /// Display id per asset, unique across the graph.
    ///
    /// Assets whose formatted ids collide keep their raw identifier instead.
    /// An asset whose id is still taken after that is left out (`None`).
    fn node_ids(&self, assets: &[String]) -> Vec<Option<String>> {
        let formatted: Vec<String> = assets
            .iter()
            .map(|asset| self.display.display_id(asset))
            .collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for id in &formatted {
            *counts.entry(id.as_str()).or_default() += 1;
        }

        let mut taken = HashSet::new();
        assets
            .iter()
            .zip(&formatted)
            .map(|(asset, id)| {
                let id = if counts[id.as_str()] > 1 {
                    asset.clone()
                } else {
                    id.clone()
                };
                if taken.insert(id.clone()) {
                    Some(id)
                } else {
                    warn!(
                        asset = %asset,
                        id = %id,
                        "Duplicate node id, leaving asset out of graph"
                    );
                    None
                }
            })
            .collect()
    }
}
