//! Graph operations over a pair of sorted tables.
//!
//! [`GraphStore`] is the only type that talks to [`KvStore`] handles. It turns
//! vertex and edge lookups into gets and range scans via the key codec, and
//! hands everything above it typed values instead of raw bytes.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::trace;

use crate::types::{EdgeKey, GraphError, Result, VertexId};

use super::keys::{adjacency_bounds, decode_edge_dest, decode_edge_key, encode_edge_key};
use super::kv::{ColumnFilter, KvStore, Row, ScanRange, Scanner, StoreProvider};
use super::metrics::{default_metrics, JobMetrics};
use super::options::{GraphConfig, RANK_PROPERTY};
use super::props::{decode_cell, decode_or_default, encode_qualifier, encode_value};
use super::types::{Edge, PropValue, TypeTag, Vertex};

/// Property carried by every edge row so the row exists even without user
/// properties.
pub const EDGE_LABEL_PROPERTY: &str = "label";

/// Row a property read or write targets.
#[derive(Clone, Copy, Debug)]
pub enum Entity<'a> {
    /// A vertex row.
    Vertex(&'a VertexId),
    /// An edge row.
    Edge(&'a EdgeKey),
}

/// A vertex id paired with its stored rank, if any.
#[derive(Clone, Debug, PartialEq)]
pub struct RankedVertex {
    /// Vertex row key.
    pub id: VertexId,
    /// Stored rank; `None` when the vertex has never been seeded.
    pub rank: Option<f64>,
}

impl RankedVertex {
    /// Pairs `id` with `rank`; pass `None` for an unseeded vertex.
    pub fn new(id: impl Into<VertexId>, rank: Option<f64>) -> Self {
        Self {
            id: id.into(),
            rank,
        }
    }

    /// Rank with the documented default of `0.0` for unseeded vertices.
    pub fn rank_or_default(&self) -> f64 {
        self.rank.unwrap_or(0.0)
    }
}

/// Graph view over one vertex table and one edge table.
pub struct GraphStore<S: KvStore> {
    config: GraphConfig,
    vertices: S,
    edges: S,
    rank_qualifier: Vec<u8>,
    metrics: Arc<dyn JobMetrics>,
}

impl<S: KvStore> GraphStore<S> {
    /// Validates `config` and opens both tables through `provider`.
    ///
    /// Configuration problems are reported before any store access.
    pub fn open<P>(provider: &P, config: &GraphConfig) -> Result<Self>
    where
        P: StoreProvider<Table = S>,
    {
        config.validate()?;
        let vertices = provider.open_table(&config.vertex_table)?;
        let edges = provider.open_table(&config.edge_table)?;
        Ok(Self {
            config: config.clone(),
            vertices,
            edges,
            rank_qualifier: encode_qualifier(RANK_PROPERTY, TypeTag::Double),
            metrics: default_metrics(),
        })
    }

    /// Routes adjacency-scan counts to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn JobMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Table configuration this store was opened with.
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Looks up a vertex row.
    ///
    /// `Ok(None)` means the row does not exist; store failures are errors and
    /// are never folded into absence.
    pub fn get_vertex(&self, id: &VertexId) -> Result<Option<Vertex>> {
        let Some(row) = self.vertices.get(id.as_bytes())? else {
            return Ok(None);
        };
        Ok(Some(Vertex {
            id: id.clone(),
            props: decode_props(&row)?,
        }))
    }

    /// Looks up an edge row by its composite key.
    pub fn get_edge(&self, key: &EdgeKey) -> Result<Option<Edge>> {
        let row_key = encode_edge_key(&key.source, &key.label, &key.dest);
        let Some(row) = self.edges.get(&row_key)? else {
            return Ok(None);
        };
        Ok(Some(Edge {
            key: key.clone(),
            props: decode_props(&row)?,
        }))
    }

    /// Destination ids of every outgoing edge of `vertex`.
    ///
    /// Issues one keys-only range scan over the vertex's adjacency range. The
    /// sequence is lazy and single-pass; scan again for a second pass.
    pub fn outgoing_edge_ids(&self, vertex: &VertexId) -> Result<OutgoingIds<'_>> {
        Ok(OutgoingIds {
            rows: self.adjacency_scan(vertex)?,
        })
    }

    /// Full keys (label included) of every outgoing edge of `vertex`.
    pub fn outgoing_edges(&self, vertex: &VertexId) -> Result<OutgoingEdges<'_>> {
        Ok(OutgoingEdges {
            rows: self.adjacency_scan(vertex)?,
        })
    }

    fn adjacency_scan(&self, vertex: &VertexId) -> Result<Scanner<'_>> {
        let (start, stop) = adjacency_bounds(vertex);
        self.metrics.adjacency_scan();
        trace!(vertex = %vertex, "graph.adjacency_scan");
        self.edges
            .scan(ScanRange::new(start, stop), ColumnFilter::FirstCellOnly)
    }

    /// Reads a typed property, or the tag's default when the column (or the
    /// whole row) is absent.
    pub fn get_property(&self, entity: Entity<'_>, name: &str, tag: TypeTag) -> Result<PropValue> {
        let (table, key) = self.locate(entity);
        let row = table.get(&key)?;
        let qualifier = encode_qualifier(name, tag);
        decode_or_default(tag, row.as_ref().and_then(|r| r.get(&qualifier)))
    }

    /// Writes one typed property, replacing any value at that qualifier.
    pub fn put_property(&self, entity: Entity<'_>, name: &str, value: &PropValue) -> Result<()> {
        let (table, key) = self.locate(entity);
        table.put(&key, &encode_qualifier(name, value.tag()), &encode_value(value))
    }

    /// Stored rank of `vertex`, `None` when never written.
    pub fn get_rank(&self, vertex: &VertexId) -> Result<Option<f64>> {
        let row = self.vertices.get(vertex.as_bytes())?;
        self.rank_from_row(row.as_ref())
    }

    /// Overwrites the rank of `vertex`.
    pub fn put_rank(&self, vertex: &VertexId, rank: f64) -> Result<()> {
        let value = encode_value(&PropValue::Double(rank));
        self.vertices.put(vertex.as_bytes(), &self.rank_qualifier, &value)
    }

    /// Creates or extends a vertex row with `props`.
    pub fn put_vertex(&self, id: &VertexId, props: &[(&str, PropValue)]) -> Result<()> {
        if props.is_empty() {
            return Err(GraphError::Invalid(format!(
                "vertex {id} needs at least one property to exist"
            )));
        }
        for (name, value) in props {
            self.put_property(Entity::Vertex(id), name, value)?;
        }
        Ok(())
    }

    /// Creates or extends an edge row. The label is always stored as the
    /// `label` property.
    pub fn put_edge(&self, key: &EdgeKey, props: &[(&str, PropValue)]) -> Result<()> {
        self.put_property(
            Entity::Edge(key),
            EDGE_LABEL_PROPERTY,
            &PropValue::Str(key.label.clone()),
        )?;
        for (name, value) in props {
            self.put_property(Entity::Edge(key), name, value)?;
        }
        Ok(())
    }

    /// Lazily scans vertex rows in `range`, decoding only the rank column.
    pub fn scan_ranked_vertices(&self, range: ScanRange) -> Result<RankedVertices<'_, S>> {
        Ok(RankedVertices {
            graph: self,
            rows: self.vertices.scan(range, ColumnFilter::All)?,
        })
    }

    /// Number of vertex rows.
    pub fn count_vertices(&self) -> Result<u64> {
        let mut count = 0u64;
        for row in self.vertices.scan(ScanRange::all(), ColumnFilter::FirstCellOnly)? {
            row?;
            count += 1;
        }
        Ok(count)
    }

    /// Splits the vertex table into at most `parts` contiguous ranges of
    /// roughly equal row counts. Together the ranges cover the whole key space.
    pub fn vertex_partitions(&self, parts: usize) -> Result<Vec<ScanRange>> {
        let total = self.count_vertices()?;
        let parts = parts.max(1) as u64;
        if total == 0 || parts == 1 {
            return Ok(vec![ScanRange::all()]);
        }
        let per_part = total.div_ceil(parts);
        let mut boundaries = Vec::new();
        let scanner = self.vertices.scan(ScanRange::all(), ColumnFilter::FirstCellOnly)?;
        for (idx, row) in scanner.enumerate() {
            let row = row?;
            if idx as u64 > 0 && idx as u64 % per_part == 0 {
                boundaries.push(row.key);
            }
        }
        let mut ranges = Vec::with_capacity(boundaries.len() + 1);
        let mut start = Vec::new();
        for boundary in boundaries {
            ranges.push(ScanRange::new(start, boundary.clone()));
            start = boundary;
        }
        ranges.push(ScanRange { start, stop: None });
        Ok(ranges)
    }

    fn rank_from_row(&self, row: Option<&Row>) -> Result<Option<f64>> {
        match row.and_then(|r| r.get(&self.rank_qualifier)) {
            Some(bytes) => Ok(decode_or_default(TypeTag::Double, Some(bytes))?.as_double()),
            None => Ok(None),
        }
    }

    fn locate(&self, entity: Entity<'_>) -> (&S, Vec<u8>) {
        match entity {
            Entity::Vertex(id) => (&self.vertices, id.as_bytes().to_vec()),
            Entity::Edge(key) => (&self.edges, encode_edge_key(&key.source, &key.label, &key.dest)),
        }
    }
}

/// Destination ids yielded by [`GraphStore::outgoing_edge_ids`].
pub struct OutgoingIds<'a> {
    rows: Scanner<'a>,
}

impl Iterator for OutgoingIds<'_> {
    type Item = Result<VertexId>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows
            .next()
            .map(|row| row.and_then(|row| decode_edge_dest(&row.key)))
    }
}

/// Edge keys yielded by [`GraphStore::outgoing_edges`].
pub struct OutgoingEdges<'a> {
    rows: Scanner<'a>,
}

impl Iterator for OutgoingEdges<'_> {
    type Item = Result<EdgeKey>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows
            .next()
            .map(|row| row.and_then(|row| decode_edge_key(&row.key)))
    }
}

/// Vertex ranks yielded by [`GraphStore::scan_ranked_vertices`].
pub struct RankedVertices<'a, S: KvStore> {
    graph: &'a GraphStore<S>,
    rows: Scanner<'a>,
}

impl<S: KvStore> Iterator for RankedVertices<'_, S> {
    type Item = Result<RankedVertex>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(err) => return Some(Err(err)),
        };
        let rank = self.graph.rank_from_row(Some(&row));
        Some(rank.map(|rank| RankedVertex::new(VertexId::from_bytes(row.key), rank)))
    }
}

fn decode_props(row: &Row) -> Result<BTreeMap<String, PropValue>> {
    row.cells
        .iter()
        .map(|(qualifier, value)| decode_cell(qualifier, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use crate::storage::metrics::CounterMetrics;

    fn graph() -> GraphStore<crate::storage::memory::MemoryTable> {
        let store = MemoryStore::new().with_scan_batch(2);
        GraphStore::open(&store, &GraphConfig::new("vertex", "edge")).unwrap()
    }

    fn ids(graph: &GraphStore<crate::storage::memory::MemoryTable>, v: &str) -> Vec<String> {
        graph
            .outgoing_edge_ids(&VertexId::from(v))
            .unwrap()
            .map(|id| id.unwrap().to_string())
            .collect()
    }

    #[test]
    fn open_rejects_missing_configuration_first() {
        let err = GraphStore::open(&MemoryStore::new(), &GraphConfig::new("vertex", ""));
        assert!(matches!(err, Err(GraphError::ConfigurationMissing(_))));
    }

    #[test]
    fn adjacency_scan_stays_within_vertex() {
        let g = graph();
        g.put_edge(&EdgeKey::new("A", "l1", "B"), &[]).unwrap();
        g.put_edge(&EdgeKey::new("A", "l1", "Z"), &[]).unwrap();
        g.put_edge(&EdgeKey::new("AB", "l1", "Q"), &[]).unwrap();
        g.put_edge(&EdgeKey::new("A}", "l1", "R"), &[]).unwrap();
        assert_eq!(ids(&g, "A"), vec!["B", "Z"]);
        assert_eq!(ids(&g, "AB"), vec!["Q"]);
        assert!(ids(&g, "C").is_empty());
    }

    #[test]
    fn missing_vertex_is_none_and_offline_store_is_error() {
        let store = MemoryStore::new();
        let g = GraphStore::open(&store, &GraphConfig::new("vertex", "edge")).unwrap();
        assert!(g.get_vertex(&VertexId::from("nope")).unwrap().is_none());
        store.open_table("vertex").unwrap().set_unavailable(true);
        assert!(matches!(
            g.get_vertex(&VertexId::from("nope")),
            Err(GraphError::StoreUnavailable(_))
        ));
    }

    #[test]
    fn properties_default_when_absent() {
        let g = graph();
        let v = VertexId::from("A");
        assert_eq!(
            g.get_property(Entity::Vertex(&v), RANK_PROPERTY, TypeTag::Double).unwrap(),
            PropValue::Double(0.0)
        );
        assert_eq!(g.get_rank(&v).unwrap(), None);
        g.put_rank(&v, 0.25).unwrap();
        assert_eq!(g.get_rank(&v).unwrap(), Some(0.25));
        g.put_rank(&v, 0.5).unwrap();
        let vertex = g.get_vertex(&v).unwrap().unwrap();
        assert_eq!(vertex.props.get(RANK_PROPERTY), Some(&PropValue::Double(0.5)));
    }

    #[test]
    fn edge_properties_roundtrip() {
        let g = graph();
        let key = EdgeKey::new("A", "knows", "B");
        g.put_edge(&key, &[("weight", PropValue::Float(0.5))]).unwrap();
        let edge = g.get_edge(&key).unwrap().unwrap();
        assert_eq!(edge.props.get("weight"), Some(&PropValue::Float(0.5)));
        assert_eq!(edge.props.get(EDGE_LABEL_PROPERTY), Some(&PropValue::Str("knows".into())));
        assert!(g.get_edge(&EdgeKey::new("A", "knows", "C")).unwrap().is_none());
    }

    #[test]
    fn unknown_tag_fails_vertex_decoding() {
        let store = MemoryStore::new();
        let g = GraphStore::open(&store, &GraphConfig::new("vertex", "edge")).unwrap();
        store
            .open_table("vertex")
            .unwrap()
            .put(b"A", b"color$Colour", b"red")
            .unwrap();
        assert!(matches!(g.get_vertex(&VertexId::from("A")), Err(GraphError::UnsupportedType(_))));
    }

    #[test]
    fn partitions_cover_all_vertices_once() {
        let g = graph();
        for id in ["a", "b", "c", "d", "e", "f", "g"] {
            g.put_rank(&VertexId::from(id), 1.0).unwrap();
        }
        let parts = g.vertex_partitions(3).unwrap();
        assert_eq!(parts.len(), 3);
        let mut seen = Vec::new();
        for range in parts {
            for v in g.scan_ranked_vertices(range).unwrap() {
                seen.push(v.unwrap().id.to_string());
            }
        }
        assert_eq!(seen, vec!["a", "b", "c", "d", "e", "f", "g"]);
    }

    #[test]
    fn adjacency_scans_are_counted() {
        let metrics = Arc::new(CounterMetrics::default());
        let g = graph().with_metrics(metrics.clone());
        let _ = g.outgoing_edge_ids(&VertexId::from("A")).unwrap().count();
        assert_eq!(metrics.snapshot().adjacency_scans, 1);
    }
}
