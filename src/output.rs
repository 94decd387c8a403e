use crate::analysis::CorrelationGraph;
use crate::error::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Persists a correlation graph as pretty-printed JSON.
///
/// The document is serialized once and the same bytes go to the primary
/// location and, if configured, the snapshot location. Each write lands in a
/// temporary sibling first and is renamed into place.
#[derive(Debug, Clone)]
pub struct GraphWriter {
    primary: PathBuf,
    snapshot: Option<PathBuf>,
}

impl GraphWriter {
    pub fn new(primary: impl Into<PathBuf>, snapshot: Option<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            snapshot,
        }
    }

    /// Writes the graph to every configured location.
    ///
    /// # Returns
    /// The paths that were written, primary first
    pub fn write(&self, graph: &CorrelationGraph) -> Result<Vec<PathBuf>> {
        let document = serde_json::to_string_pretty(graph)?;

        let mut written = Vec::with_capacity(2);
        for path in std::iter::once(&self.primary).chain(self.snapshot.as_ref()) {
            write_atomically(path, document.as_bytes())?;
            info!(path = %path.display(), bytes = document.len(), "Wrote correlation graph");
            written.push(path.clone());
        }

        Ok(written)
    }
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let io_error = |source: std::io::Error| PipelineError::Output {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = fs::write(&tmp, contents) {
        fs::remove_file(&tmp).ok();
        return Err(io_error(e));
    }
    fs::rename(&tmp, path).map_err(|e| {
        fs::remove_file(&tmp).ok();
        io_error(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{GraphEdge, GraphNode};

    fn create_test_graph() -> CorrelationGraph {
        CorrelationGraph {
            nodes: vec![
                GraphNode {
                    id: "BTC".to_string(),
                    group: "Crypto".to_string(),
                },
                GraphNode {
                    id: "ETH".to_string(),
                    group: "Crypto".to_string(),
                },
            ],
            links: vec![GraphEdge {
                source: "BTC".to_string(),
                target: "ETH".to_string(),
                value: 0.86,
                is_positive: true,
            }],
        }
    }

    #[test]
    fn test_writes_identical_documents() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("src/data/correlations.json");
        let snapshot = dir.path().join("correlation_data.json");
        let writer = GraphWriter::new(&primary, Some(snapshot.clone()));

        let written = writer.write(&create_test_graph()).unwrap();

        assert_eq!(written, vec![primary.clone(), snapshot.clone()]);
        let a = fs::read_to_string(&primary).unwrap();
        let b = fs::read_to_string(&snapshot).unwrap();
        assert_eq!(a, b);

        let parsed: CorrelationGraph = serde_json::from_str(&a).unwrap();
        assert_eq!(parsed, create_test_graph());
        assert!(a.contains("\"isPositive\": true"));
        assert!(!dir.path().join("correlation_data.json.tmp").exists());
    }

    #[test]
    fn test_snapshot_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let primary = dir.path().join("graph.json");
        let writer = GraphWriter::new(&primary, None);

        let written = writer.write(&CorrelationGraph::default()).unwrap();

        assert_eq!(written, vec![primary.clone()]);
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&primary).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "nodes": [], "links": [] }));
    }

    #[test]
    fn test_unwritable_location_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let writer = GraphWriter::new(blocker.join("graph.json"), None);

        let result = writer.write(&create_test_graph());

        assert!(matches!(result, Err(PipelineError::Output { .. })));
    }
}
