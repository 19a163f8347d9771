//! Iterative rank propagation over a [`GraphStore`](crate::storage::GraphStore).
//!
//! One iteration runs three stages: the [`mapper`] reads each vertex's rank
//! and emits an equal share to every out-neighbour, the [`aggregate`] stage
//! groups shares by destination and sums them, and the [`import`] stage
//! persists the sums as the next ranks. Stages hand data to each other as
//! plain values or [`batch`] files so each can be re-run on its own.

/// Grouping and summation of contributions.
pub mod aggregate;
/// Rank batch files exchanged between stages.
pub mod batch;
/// Persisting rank batches into the vertex table.
pub mod import;
/// Iteration driver and rank seeding.
pub mod job;
/// Per-vertex share computation.
pub mod mapper;

use serde::Serialize;

use crate::types::VertexId;

pub use aggregate::{aggregate, reduce_bucket, sum_shares, Shuffle};
pub use batch::{read_batch, write_batch, RankBatchReader, RankBatchWriter};
pub use import::{run_import, ImportSummary, RankImportWriter};
pub use job::{seed_ranks, IterationStats, Propagation, RankJob, RankOptions, Seed, SinkPolicy};
pub use mapper::{dispatch, Contribution, ContributionSink, MapperState, RankMapper, VertexOutcome};

/// A new rank value for one vertex.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RankUpdate {
    /// Vertex whose rank is replaced.
    #[serde(serialize_with = "serialize_vertex")]
    pub vertex: VertexId,
    /// Replacement rank.
    pub rank: f64,
}

impl RankUpdate {
    /// Pairs a vertex with its new rank.
    pub fn new(vertex: impl Into<VertexId>, rank: f64) -> Self {
        Self {
            vertex: vertex.into(),
            rank,
        }
    }
}

fn serialize_vertex<S: serde::Serializer>(id: &VertexId, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&id.to_string())
}
