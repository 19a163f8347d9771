use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use rustc_hash::FxHashSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::storage::keys::validate_component;
use crate::storage::{GraphStore, KvStore, PropValue};
use crate::types::{EdgeKey, VertexId};

use super::CliError;

/// Property written on endpoint vertices the loader has to create, so the
/// vertex row exists before any rank is seeded.
pub const VERTEX_ID_PROPERTY: &str = "id";

const PROGRESS_EVERY: u64 = 10_000;

/// Configuration for loading an edge list from CSV.
#[derive(Debug, Clone)]
pub struct EdgeLoadConfig {
    /// Path to the CSV file.
    pub path: PathBuf,
    /// Column holding source vertex ids.
    pub src_column: String,
    /// Column holding edge labels.
    pub label_column: String,
    /// Column holding destination vertex ids.
    pub dst_column: String,
}

impl EdgeLoadConfig {
    /// Uses the default `src,label,dst` header.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            src_column: "src".into(),
            label_column: "label".into(),
            dst_column: "dst".into(),
        }
    }
}

/// Counts from a load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Edge rows written.
    pub edges: u64,
    /// Vertex rows created for endpoints that had none.
    pub vertices_created: u64,
}

struct ColumnSpec {
    name: String,
    index: usize,
}

/// Loads edges from CSV into `graph`.
///
/// Columns besides the three key columns become edge properties, typed by
/// their literal (`true`/`false`, integers, floats, otherwise strings). Every
/// endpoint gets a vertex row.
pub fn load_edges<S: KvStore>(
    graph: &GraphStore<S>,
    cfg: &EdgeLoadConfig,
) -> Result<LoadSummary, CliError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&cfg.path)?;
    let headers = reader.headers()?.clone();
    let src_index = find_column(&headers, &cfg.src_column)?;
    let label_index = find_column(&headers, &cfg.label_column)?;
    let dst_index = find_column(&headers, &cfg.dst_column)?;
    let prop_columns: Vec<ColumnSpec> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| ![src_index, label_index, dst_index].contains(idx))
        .map(|(index, name)| ColumnSpec {
            name: name.to_string(),
            index,
        })
        .collect();

    let mut known: FxHashSet<VertexId> = FxHashSet::default();
    let mut summary = LoadSummary::default();
    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let line = line + 2;
        let src = get_required(&record, src_index, &cfg.src_column, line)?;
        let label = get_required(&record, label_index, &cfg.label_column, line)?;
        let dst = get_required(&record, dst_index, &cfg.dst_column, line)?;
        validate_component("source id", src.as_bytes())?;
        validate_component("label", label.as_bytes())?;
        validate_component("destination id", dst.as_bytes())?;

        let key = EdgeKey::new(src, label, dst);
        for id in [&key.source, &key.dest] {
            if ensure_vertex(graph, &mut known, id)? {
                summary.vertices_created += 1;
            }
        }
        let props = build_props(&record, &prop_columns);
        let props: Vec<(&str, PropValue)> = props
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        graph.put_edge(&key, &props)?;
        summary.edges += 1;
        if summary.edges % PROGRESS_EVERY == 0 {
            debug!(edges = summary.edges, "load.progress");
        }
    }
    info!(
        path = %cfg.path.display(),
        edges = summary.edges,
        vertices_created = summary.vertices_created,
        "load.done"
    );
    Ok(summary)
}

fn ensure_vertex<S: KvStore>(
    graph: &GraphStore<S>,
    known: &mut FxHashSet<VertexId>,
    id: &VertexId,
) -> Result<bool, CliError> {
    if known.contains(id) {
        return Ok(false);
    }
    let created = if graph.get_vertex(id)?.is_none() {
        graph.put_vertex(id, &[(VERTEX_ID_PROPERTY, PropValue::Str(id.to_string()))])?;
        true
    } else {
        false
    };
    known.insert(id.clone());
    Ok(created)
}

fn find_column(headers: &StringRecord, name: &str) -> Result<usize, CliError> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| CliError::Message(format!("column '{}' not found", name)))
}

fn get_required<'a>(
    record: &'a StringRecord,
    idx: usize,
    name: &str,
    line: usize,
) -> Result<&'a str, CliError> {
    record
        .get(idx)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CliError::Message(format!("line {line}: missing value for column '{name}'")))
}

fn build_props(record: &StringRecord, columns: &[ColumnSpec]) -> Vec<(String, PropValue)> {
    columns
        .iter()
        .filter_map(|col| {
            let raw = record.get(col.index)?;
            if raw.is_empty() {
                return None;
            }
            Some((col.name.clone(), parse_value(raw)))
        })
        .collect()
}

fn parse_value(raw: &str) -> PropValue {
    let lower = raw.to_ascii_lowercase();
    if lower == "true" {
        return PropValue::Bool(true);
    }
    if lower == "false" {
        return PropValue::Bool(false);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return PropValue::Long(int_val);
    }
    if let Ok(float_val) = raw.parse::<f64>() {
        if float_val.is_finite() {
            return PropValue::Double(float_val);
        }
    }
    PropValue::Str(raw.to_string())
}

/// Convenience wrapper taking only a path with the default header.
pub fn load_edge_file<S: KvStore>(
    graph: &GraphStore<S>,
    path: &Path,
) -> Result<LoadSummary, CliError> {
    load_edges(graph, &EdgeLoadConfig::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GraphConfig, MemoryStore};
    use std::fs;

    fn graph() -> GraphStore<crate::storage::MemoryTable> {
        GraphStore::open(&MemoryStore::new(), &GraphConfig::new("vertex", "edge")).unwrap()
    }

    #[test]
    fn loads_edges_and_creates_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        fs::write(&path, "src,label,dst,weight\nA,knows,B,3\nA,knows,C,\nB,likes,C,0.5\n").unwrap();
        let g = graph();
        let summary = load_edge_file(&g, &path).unwrap();
        assert_eq!(
            summary,
            LoadSummary {
                edges: 3,
                vertices_created: 3
            }
        );

        let edge = g.get_edge(&EdgeKey::new("A", "knows", "B")).unwrap().unwrap();
        assert_eq!(edge.props.get("weight"), Some(&PropValue::Long(3)));
        let edge = g.get_edge(&EdgeKey::new("B", "likes", "C")).unwrap().unwrap();
        assert_eq!(edge.props.get("weight"), Some(&PropValue::Double(0.5)));
        assert!(g.get_vertex(&VertexId::from("C")).unwrap().is_some());
        assert_eq!(g.get_rank(&VertexId::from("C")).unwrap(), None);

        let again = load_edge_file(&g, &path).unwrap();
        assert_eq!(again.vertices_created, 0);
    }

    #[test]
    fn delimiter_in_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        fs::write(&path, "src,label,dst\n\"A|x\",knows,B\n").unwrap();
        let err = load_edge_file(&graph(), &path).unwrap_err();
        assert!(err.to_string().contains("delimiter"), "{err}");
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        fs::write(&path, "from,label,to\nA,knows,B\n").unwrap();
        let err = load_edge_file(&graph(), &path).unwrap_err();
        assert_eq!(err.to_string(), "column 'src' not found");
    }

    #[test]
    fn literals_are_typed() {
        assert_eq!(parse_value("TRUE"), PropValue::Bool(true));
        assert_eq!(parse_value("-7"), PropValue::Long(-7));
        assert_eq!(parse_value("1.5"), PropValue::Double(1.5));
        assert_eq!(parse_value("NaN"), PropValue::Str("NaN".into()));
        assert_eq!(parse_value("bob"), PropValue::Str("bob".into()));
    }
}
