//! Driving whole propagation iterations.
//!
//! The map phase runs one worker per vertex partition on the rayon pool. Each
//! worker opens its own table handles through the [`StoreProvider`], so no
//! store handle ever crosses a thread boundary. Shares are routed into
//! reducer buckets and the buckets are reduced in parallel.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::storage::{
    default_metrics, GraphConfig, GraphStore, JobMetrics, KvStore, ScanRange, StoreProvider,
};
use crate::types::{GraphError, Result, VertexId};

use super::aggregate::{reduce_bucket, Shuffle};
use super::batch::write_batch;
use super::import::{ImportSummary, RankImportWriter};
use super::mapper::RankMapper;
use super::RankUpdate;

/// What happens to the rank held by vertices without outgoing edges.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkPolicy {
    /// The mass is not forwarded and leaves the system.
    #[default]
    Drop,
    /// The mass is spread evenly over every vertex.
    Redistribute,
}

impl FromStr for SinkPolicy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "drop" => Ok(SinkPolicy::Drop),
            "redistribute" => Ok(SinkPolicy::Redistribute),
            other => Err(GraphError::Invalid(format!(
                "unknown sink policy '{other}' (expected drop or redistribute)"
            ))),
        }
    }
}

impl fmt::Display for SinkPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SinkPolicy::Drop => "drop",
            SinkPolicy::Redistribute => "redistribute",
        })
    }
}

/// Tuning for a [`RankJob`].
#[derive(Clone, Debug)]
pub struct RankOptions {
    /// Number of vertex-range partitions mapped in parallel.
    pub partitions: usize,
    /// Number of reducer buckets.
    pub reducers: usize,
    /// Damping factor `d`; when set every mapped vertex receives
    /// `(1 - d) / N + d * incoming`.
    pub damping: Option<f64>,
    /// Treatment of sink mass.
    pub sink_policy: SinkPolicy,
    /// Directory for per-iteration batch files.
    pub scratch_dir: PathBuf,
}

impl Default for RankOptions {
    fn default() -> Self {
        Self {
            partitions: 4,
            reducers: 4,
            damping: None,
            sink_policy: SinkPolicy::Drop,
            scratch_dir: std::env::temp_dir().join("rowgraph"),
        }
    }
}

impl RankOptions {
    /// Checks ranges of every knob.
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(GraphError::Invalid("partitions must be at least 1".into()));
        }
        if self.reducers == 0 {
            return Err(GraphError::Invalid("reducers must be at least 1".into()));
        }
        if let Some(d) = self.damping {
            if !(d > 0.0 && d <= 1.0) {
                return Err(GraphError::Invalid(format!("damping {d} must lie in (0, 1]")));
            }
        }
        Ok(())
    }

    fn needs_full_rewrite(&self) -> bool {
        self.damping.is_some() || self.sink_policy == SinkPolicy::Redistribute
    }
}

/// Counters for one propagation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct IterationStats {
    /// 1-based iteration number; 0 for a standalone propagation.
    pub iteration: usize,
    /// Vertices mapped.
    pub vertices: u64,
    /// Vertices without a stored rank, mapped as 0.0.
    pub unseeded: u64,
    /// Vertices with no outgoing edges.
    pub sinks: u64,
    /// Rank held by sinks at the start of the iteration.
    pub sink_mass: f64,
    /// Contributions emitted by the mapper.
    pub contributions: u64,
    /// Rank updates produced.
    pub updates: u64,
    /// Total rank held by mapped vertices before the iteration.
    pub mass_before: f64,
    /// Total rank carried by the produced updates.
    pub mass_after: f64,
    /// Wall time.
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

/// Result of the map and reduce phases, not yet persisted.
#[derive(Clone, Debug)]
pub struct Propagation {
    /// New ranks, ordered by vertex id.
    pub updates: Vec<RankUpdate>,
    /// Counters for the run.
    pub stats: IterationStats,
}

/// Initial rank assignment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Seed {
    /// `1 / N` for every vertex, where `N` is the vertex count.
    Uniform,
    /// The given value for every vertex.
    Value(f64),
}

#[derive(Default)]
struct MapOutput {
    shuffle: Option<Shuffle>,
    vertices: Vec<VertexId>,
    mapped: u64,
    unseeded: u64,
    sinks: u64,
    sink_mass: f64,
    mass: f64,
    contributions: u64,
}

/// Runs propagation iterations against the tables named by a [`GraphConfig`].
pub struct RankJob<'p, P: StoreProvider> {
    provider: &'p P,
    config: GraphConfig,
    options: RankOptions,
    metrics: Arc<dyn JobMetrics>,
}

impl<'p, P: StoreProvider> RankJob<'p, P> {
    /// Checks configuration and options without touching the store.
    pub fn new(provider: &'p P, config: GraphConfig, options: RankOptions) -> Result<Self> {
        config.validate()?;
        options.validate()?;
        Ok(Self {
            provider,
            config,
            options,
            metrics: default_metrics(),
        })
    }

    /// Routes job counters to `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn JobMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn open_graph(&self) -> Result<GraphStore<P::Table>> {
        Ok(GraphStore::open(self.provider, &self.config)?.with_metrics(self.metrics.clone()))
    }

    /// Computes the next ranks without writing them.
    pub fn propagate(&self) -> Result<Propagation> {
        let started = Instant::now();
        let ranges = self.open_graph()?.vertex_partitions(self.options.partitions)?;
        debug!(partitions = ranges.len(), "rank.map.start");

        let outputs = ranges
            .into_par_iter()
            .map(|range| self.map_partition(range))
            .collect::<Result<Vec<_>>>()?;

        let mut shuffle = Shuffle::new(self.options.reducers);
        let mut stats = IterationStats::default();
        let mut mass_before = Vec::new();
        let mut sink_mass = Vec::new();
        let mut seen: Vec<VertexId> = Vec::new();
        for out in outputs {
            if let Some(part) = out.shuffle {
                shuffle.merge(part);
            }
            stats.vertices += out.mapped;
            stats.unseeded += out.unseeded;
            stats.sinks += out.sinks;
            stats.contributions += out.contributions;
            mass_before.push(out.mass);
            sink_mass.push(out.sink_mass);
            seen.extend(out.vertices);
        }
        stats.mass_before = super::sum_shares(&mut mass_before);
        stats.sink_mass = super::sum_shares(&mut sink_mass);
        if shuffle.is_empty() {
            debug!(vertices = stats.vertices, "rank.reduce.empty");
        }

        let incoming: Vec<RankUpdate> = shuffle
            .into_buckets()
            .into_par_iter()
            .map(reduce_bucket)
            .flatten()
            .collect();

        let mut updates = if self.options.needs_full_rewrite() {
            self.rewrite_all(incoming, seen, &stats)
        } else {
            incoming
        };
        updates.sort_unstable_by(|a, b| a.vertex.cmp(&b.vertex));

        let mut out_mass: Vec<f64> = updates.iter().map(|u| u.rank).collect();
        stats.mass_after = super::sum_shares(&mut out_mass);
        stats.updates = updates.len() as u64;
        stats.elapsed = started.elapsed();
        if stats.vertices > 0 && stats.unseeded == stats.vertices {
            warn!("no vertex carries a rank; seed the graph before propagating");
        }
        Ok(Propagation { updates, stats })
    }

    fn map_partition(&self, range: ScanRange) -> Result<MapOutput> {
        let graph = self.open_graph()?;
        let mut mapper = RankMapper::new(&graph, self.metrics.clone());
        let mut shuffle = Shuffle::new(self.options.reducers);
        let mut out = MapOutput::default();
        let mut masses = Vec::new();
        let mut sink_masses = Vec::new();
        for vertex in graph.scan_ranked_vertices(range)? {
            let vertex = vertex?;
            let outcome = mapper.map_vertex(&vertex, &mut shuffle)?;
            out.mapped += 1;
            out.contributions += outcome.out_degree as u64;
            masses.push(outcome.rank);
            if !outcome.seeded {
                out.unseeded += 1;
            }
            if outcome.is_sink() {
                out.sinks += 1;
                sink_masses.push(outcome.rank);
            }
            if self.options.needs_full_rewrite() {
                out.vertices.push(vertex.id);
            }
        }
        out.mass = super::sum_shares(&mut masses);
        out.sink_mass = super::sum_shares(&mut sink_masses);
        out.shuffle = Some(shuffle);
        Ok(out)
    }

    /// Applies teleport and sink redistribution over every known vertex.
    fn rewrite_all(
        &self,
        incoming: Vec<RankUpdate>,
        seen: Vec<VertexId>,
        stats: &IterationStats,
    ) -> Vec<RankUpdate> {
        let mut by_vertex: FxHashMap<VertexId, f64> =
            incoming.into_iter().map(|u| (u.vertex, u.rank)).collect();
        let mut all: FxHashSet<VertexId> = seen.into_iter().collect();
        all.extend(by_vertex.keys().cloned());
        let n = all.len().max(1) as f64;
        let spread = match self.options.sink_policy {
            SinkPolicy::Redistribute => stats.sink_mass / n,
            SinkPolicy::Drop => 0.0,
        };
        all.into_iter()
            .map(|vertex| {
                let received = by_vertex.remove(&vertex).unwrap_or(0.0) + spread;
                let rank = match self.options.damping {
                    Some(d) => (1.0 - d) / n + d * received,
                    None => received,
                };
                RankUpdate { vertex, rank }
            })
            .collect()
    }

    /// Persists `updates` through a fresh graph handle.
    pub fn import(&self, updates: &[RankUpdate]) -> Result<ImportSummary> {
        let graph = self.open_graph()?;
        let mut writer = RankImportWriter::new(&graph).with_metrics(self.metrics.clone());
        for update in updates {
            writer.write(update)?;
        }
        Ok(writer.finish())
    }

    /// Runs one full iteration: propagate, spill the batch file, import it.
    ///
    /// The batch is written in full before any rank is overwritten, so a
    /// failed import can be retried from the file.
    pub fn run_iteration(&self, iteration: usize) -> Result<IterationStats> {
        let Propagation { updates, mut stats } = self.propagate()?;
        let path = self
            .options
            .scratch_dir
            .join(format!("iteration-{iteration:04}.csv"));
        write_batch(&path, &updates)?;
        let graph = self.open_graph()?;
        let mut writer = RankImportWriter::new(&graph).with_metrics(self.metrics.clone());
        writer.import_file(&path)?;
        writer.finish();
        stats.iteration = iteration;
        info!(
            iteration,
            vertices = stats.vertices,
            updates = stats.updates,
            sinks = stats.sinks,
            mass = stats.mass_after,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "rank.iteration.done"
        );
        Ok(stats)
    }

    /// Runs `iterations` iterations back to back, stopping at the first
    /// failure.
    pub fn run(&self, iterations: usize) -> Result<Vec<IterationStats>> {
        (1..=iterations).map(|k| self.run_iteration(k)).collect()
    }
}

/// Writes an initial rank onto every vertex row. Returns the number seeded.
pub fn seed_ranks<S: KvStore>(graph: &GraphStore<S>, seed: Seed) -> Result<u64> {
    let value = match seed {
        Seed::Value(v) if v.is_finite() => v,
        Seed::Value(v) => return Err(GraphError::Invalid(format!("seed rank {v} is not finite"))),
        Seed::Uniform => {
            let n = graph.count_vertices()?;
            if n == 0 {
                return Ok(0);
            }
            1.0 / n as f64
        }
    };
    let ids = graph
        .scan_ranked_vertices(ScanRange::all())?
        .map(|v| v.map(|v| v.id))
        .collect::<Result<Vec<_>>>()?;
    for id in &ids {
        graph.put_rank(id, value)?;
    }
    info!(vertices = ids.len(), rank = value, "rank.seed.done");
    Ok(ids.len() as u64)
}

fn serialize_millis<S: serde::Serializer>(
    d: &Duration,
    ser: S,
) -> std::result::Result<S::Ok, S::Error> {
    ser.serialize_u64(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::types::EdgeKey;

    fn config() -> GraphConfig {
        GraphConfig::new("vertex", "edge")
    }

    fn ring(store: &MemoryStore) -> GraphStore<crate::storage::MemoryTable> {
        let graph = GraphStore::open(store, &config()).unwrap();
        for (s, d) in [("a", "b"), ("b", "c"), ("c", "a"), ("a", "c")] {
            graph.put_edge(&EdgeKey::new(s, "link", d), &[]).unwrap();
        }
        for v in ["a", "b", "c", "d"] {
            graph.put_rank(&VertexId::from(v), 0.25).unwrap();
        }
        graph
    }

    fn options(dir: &tempfile::TempDir) -> RankOptions {
        RankOptions {
            partitions: 3,
            reducers: 2,
            scratch_dir: dir.path().to_path_buf(),
            ..RankOptions::default()
        }
    }

    #[test]
    fn rejects_bad_options_before_store_access() {
        let store = MemoryStore::new();
        let bad = RankOptions {
            damping: Some(1.5),
            ..RankOptions::default()
        };
        assert!(matches!(RankJob::new(&store, config(), bad), Err(GraphError::Invalid(_))));
        assert!(matches!(
            RankJob::new(&store, GraphConfig::new("vertex", ""), RankOptions::default()),
            Err(GraphError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn propagation_is_independent_of_partitioning() {
        let store = MemoryStore::new().with_scan_batch(1);
        ring(&store);
        let dir = tempfile::tempdir().unwrap();
        let single = RankJob::new(
            &store,
            config(),
            RankOptions {
                partitions: 1,
                reducers: 1,
                ..options(&dir)
            },
        )
        .unwrap()
        .propagate()
        .unwrap();
        let split = RankJob::new(&store, config(), options(&dir))
            .unwrap()
            .propagate()
            .unwrap();
        assert_eq!(single.updates, split.updates);
        assert_eq!(split.stats.vertices, 4);
        assert_eq!(split.stats.sinks, 1);
        assert_eq!(split.stats.contributions, 4);
    }

    #[test]
    fn sink_mass_is_dropped_by_default_and_redistributed_on_request() {
        let store = MemoryStore::new();
        ring(&store);
        let dir = tempfile::tempdir().unwrap();
        let dropped = RankJob::new(&store, config(), options(&dir))
            .unwrap()
            .propagate()
            .unwrap();
        assert!((dropped.stats.mass_after - 0.75).abs() < 1e-12);
        assert!(dropped.updates.iter().all(|u| u.vertex != VertexId::from("d")));

        let kept = RankJob::new(
            &store,
            config(),
            RankOptions {
                sink_policy: SinkPolicy::Redistribute,
                ..options(&dir)
            },
        )
        .unwrap()
        .propagate()
        .unwrap();
        assert_eq!(kept.updates.len(), 4);
        assert!((kept.stats.mass_after - 1.0).abs() < 1e-12);
    }

    #[test]
    fn damping_conserves_mass_without_sinks() {
        let store = MemoryStore::new();
        let graph = GraphStore::open(&store, &config()).unwrap();
        for (s, d) in [("a", "b"), ("b", "a")] {
            graph.put_edge(&EdgeKey::new(s, "link", d), &[]).unwrap();
        }
        graph.put_rank(&VertexId::from("a"), 1.0).unwrap();
        graph.put_rank(&VertexId::from("b"), 0.0).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let job = RankJob::new(
            &store,
            config(),
            RankOptions {
                damping: Some(0.85),
                ..options(&dir)
            },
        )
        .unwrap();
        let p = job.propagate().unwrap();
        let b = p.updates.iter().find(|u| u.vertex == VertexId::from("b")).unwrap();
        assert!((b.rank - (0.075 + 0.85)).abs() < 1e-12);
        assert!((p.stats.mass_after - 1.0).abs() < 1e-12);
    }

    #[test]
    fn run_writes_batches_and_updates_ranks() {
        let store = MemoryStore::new();
        let graph = ring(&store);
        let dir = tempfile::tempdir().unwrap();
        let job = RankJob::new(&store, config(), options(&dir)).unwrap();
        let stats = job.run(2).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[1].iteration, 2);
        assert!(dir.path().join("iteration-0001.csv").exists());
        assert!(dir.path().join("iteration-0002.csv").exists());
        // d has no in-edges and keeps its seed
        assert_eq!(graph.get_rank(&VertexId::from("d")).unwrap(), Some(0.25));
    }

    #[test]
    fn seeding_is_uniform_over_vertices() {
        let store = MemoryStore::new();
        let graph = GraphStore::open(&store, &config()).unwrap();
        for v in ["a", "b", "c", "d"] {
            let name = crate::storage::PropValue::Str(v.into());
            graph.put_vertex(&VertexId::from(v), &[("name", name)]).unwrap();
        }
        assert_eq!(seed_ranks(&graph, Seed::Uniform).unwrap(), 4);
        assert_eq!(graph.get_rank(&VertexId::from("c")).unwrap(), Some(0.25));
        assert!(seed_ranks(&graph, Seed::Value(f64::NAN)).is_err());
    }

    #[test]
    fn sink_policy_parses() {
        assert_eq!("Redistribute".parse::<SinkPolicy>().unwrap(), SinkPolicy::Redistribute);
        assert!("keep".parse::<SinkPolicy>().is_err());
    }
}
