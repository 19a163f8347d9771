//! Graph storage over a sorted key-value store.
//!
//! Vertices and edges are rows of two tables. The key codec ([`keys`],
//! [`props`]) is the only place that touches raw bytes; [`GraphStore`] is the
//! only place that touches store handles.

/// Edge row-key layout and adjacency bounds.
pub mod keys;

/// The key-value store boundary.
pub mod kv;

/// In-process store used by tests and dry runs.
pub mod memory;

/// Typed property qualifiers and value encodings.
pub mod props;

/// SQLite-backed store.
pub mod sqlite;

mod graph;
mod metrics;
mod options;
mod traverse;
mod types;

pub use graph::{
    Entity, GraphStore, OutgoingEdges, OutgoingIds, RankedVertex, RankedVertices,
    EDGE_LABEL_PROPERTY,
};
pub use kv::{Cells, ColumnFilter, KvStore, Row, ScanRange, Scanner, StoreProvider};
pub use memory::{MemoryStore, MemoryTable};
pub use metrics::{default_metrics, CounterMetrics, JobMetrics, MetricsSnapshot, NoopMetrics};
pub use options::{validate_table_name, GraphConfig, RANK_PROPERTY};
pub use sqlite::{SqliteStore, SqliteTable};
pub use traverse::{walk, TraversalStep};
pub use types::{Edge, PropValue, TypeTag, Vertex};
