pub mod correlation;
pub mod graph;

pub use correlation::{CorrelationMatrix, CorrelationMatrixBuilder};
pub use graph::{CorrelationGraph, GraphAssembler, GraphEdge, GraphNode};
