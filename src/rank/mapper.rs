use std::sync::Arc;

use tracing::trace;

use crate::storage::{GraphStore, JobMetrics, KvStore, RankedVertex};
use crate::types::{Result, VertexId};

/// One share of rank mass travelling along an edge.
#[derive(Clone, Debug, PartialEq)]
pub struct Contribution {
    /// Receiving vertex.
    pub dest: VertexId,
    /// Amount of rank forwarded.
    pub share: f64,
}

/// Receives the mapper's output.
pub trait ContributionSink {
    /// Accepts one `(destination, share)` pair.
    fn emit(&mut self, dest: VertexId, share: f64) -> Result<()>;
}

impl ContributionSink for Vec<Contribution> {
    fn emit(&mut self, dest: VertexId, share: f64) -> Result<()> {
        self.push(Contribution { dest, share });
        Ok(())
    }
}

/// Splits `rank` evenly across `dests` and emits one pair per destination.
///
/// Returns the number of pairs emitted. An empty `dests` emits nothing and
/// never divides.
pub fn dispatch<E: ContributionSink>(
    dests: Vec<VertexId>,
    rank: f64,
    sink: &mut E,
) -> Result<usize> {
    let out_degree = dests.len();
    if out_degree == 0 {
        return Ok(0);
    }
    let share = rank / out_degree as f64;
    for dest in dests {
        sink.emit(dest, share)?;
    }
    Ok(out_degree)
}

/// Where the mapper is in its per-vertex cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapperState {
    /// No vertex has been handed over yet, or the last one failed.
    Idle,
    /// Reading adjacency and computing shares for a vertex.
    PerVertexCompute,
    /// The last vertex's pairs have all been emitted.
    Emitted,
}

/// What happened to one vertex.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VertexOutcome {
    /// Rank that was distributed (0.0 when unseeded).
    pub rank: f64,
    /// Whether the vertex carried a stored rank.
    pub seeded: bool,
    /// Number of outgoing edges, equal to the number of pairs emitted.
    pub out_degree: usize,
}

impl VertexOutcome {
    /// True for a vertex with no outgoing edges; its mass is not forwarded.
    pub fn is_sink(&self) -> bool {
        self.out_degree == 0
    }
}

/// Per-vertex rank propagation over one worker's graph handle.
pub struct RankMapper<'g, S: KvStore> {
    graph: &'g GraphStore<S>,
    metrics: Arc<dyn JobMetrics>,
    state: MapperState,
}

impl<'g, S: KvStore> RankMapper<'g, S> {
    /// Builds a mapper that reads adjacency through `graph`.
    pub fn new(graph: &'g GraphStore<S>, metrics: Arc<dyn JobMetrics>) -> Self {
        Self {
            graph,
            metrics,
            state: MapperState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> MapperState {
        self.state
    }

    /// Scans `vertex`'s out-edges and emits its equal shares into `sink`.
    ///
    /// On error the mapper drops back to [`MapperState::Idle`] and the caller
    /// fails the task; nothing partial is retried here.
    pub fn map_vertex<E: ContributionSink>(
        &mut self,
        vertex: &RankedVertex,
        sink: &mut E,
    ) -> Result<VertexOutcome> {
        self.state = MapperState::PerVertexCompute;
        self.metrics.vertex_processed();
        match self.compute(vertex, sink) {
            Ok(outcome) => {
                self.state = MapperState::Emitted;
                Ok(outcome)
            }
            Err(err) => {
                self.state = MapperState::Idle;
                Err(err)
            }
        }
    }

    fn compute<E: ContributionSink>(
        &self,
        vertex: &RankedVertex,
        sink: &mut E,
    ) -> Result<VertexOutcome> {
        let rank = vertex.rank_or_default();
        let dests = self
            .graph
            .outgoing_edge_ids(&vertex.id)?
            .collect::<Result<Vec<_>>>()?;
        let out_degree = dispatch(dests, rank, sink)?;
        if out_degree == 0 {
            self.metrics.sink_vertex();
        } else {
            self.metrics.contributions_emitted(out_degree as u64);
        }
        trace!(vertex = %vertex.id, rank, out_degree, "rank.map.vertex");
        Ok(VertexOutcome {
            rank,
            seeded: vertex.rank.is_some(),
            out_degree,
        })
    }
}
