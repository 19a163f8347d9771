use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters reported by rank jobs.
///
/// Purely observational: no job decision ever reads these values back.
pub trait JobMetrics: Send + Sync {
    /// A vertex row was handed to the propagation mapper.
    fn vertex_processed(&self);

    /// A vertex had no outgoing edges and forwarded nothing.
    fn sink_vertex(&self);

    /// The mapper emitted `count` contributions for one vertex.
    fn contributions_emitted(&self, count: u64);

    /// An adjacency range scan was issued.
    fn adjacency_scan(&self);

    /// A rank value was persisted.
    fn rank_written(&self);
}

/// Discards every measurement.
#[derive(Default)]
pub struct NoopMetrics;

impl JobMetrics for NoopMetrics {
    fn vertex_processed(&self) {}
    fn sink_vertex(&self) {}
    fn contributions_emitted(&self, _count: u64) {}
    fn adjacency_scan(&self) {}
    fn rank_written(&self) {}
}

/// Monotonic atomic counters, safe to share across worker tasks.
#[derive(Default, Debug)]
pub struct CounterMetrics {
    /// Vertices processed by the mapper.
    pub vertices_processed: AtomicU64,
    /// Vertices with out-degree zero.
    pub sink_vertices: AtomicU64,
    /// Contributions emitted in total.
    pub contributions: AtomicU64,
    /// Adjacency scans issued.
    pub adjacency_scans: AtomicU64,
    /// Rank values persisted.
    pub ranks_written: AtomicU64,
}

impl CounterMetrics {
    /// Copies the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            vertices_processed: self.vertices_processed.load(Ordering::Relaxed),
            sink_vertices: self.sink_vertices.load(Ordering::Relaxed),
            contributions: self.contributions.load(Ordering::Relaxed),
            adjacency_scans: self.adjacency_scans.load(Ordering::Relaxed),
            ranks_written: self.ranks_written.load(Ordering::Relaxed),
        }
    }
}

impl JobMetrics for CounterMetrics {
    fn vertex_processed(&self) {
        self.vertices_processed.fetch_add(1, Ordering::Relaxed);
    }

    fn sink_vertex(&self) {
        self.sink_vertices.fetch_add(1, Ordering::Relaxed);
    }

    fn contributions_emitted(&self, count: u64) {
        self.contributions.fetch_add(count, Ordering::Relaxed);
    }

    fn adjacency_scan(&self) {
        self.adjacency_scans.fetch_add(1, Ordering::Relaxed);
    }

    fn rank_written(&self) {
        self.ranks_written.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`CounterMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Vertices processed by the mapper.
    pub vertices_processed: u64,
    /// Vertices with out-degree zero.
    pub sink_vertices: u64,
    /// Contributions emitted in total.
    pub contributions: u64,
    /// Adjacency scans issued.
    pub adjacency_scans: u64,
    /// Rank values persisted.
    pub ranks_written: u64,
}

/// Returns the default metrics sink, which discards everything.
pub fn default_metrics() -> Arc<dyn JobMetrics> {
    Arc::new(NoopMetrics)
}
