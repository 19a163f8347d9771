use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::storage::{default_metrics, GraphConfig, GraphStore, JobMetrics, KvStore, StoreProvider};
use crate::types::Result;

use super::batch::read_batch;
use super::RankUpdate;

/// Counts reported by an import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Rank values persisted.
    pub written: u64,
}

/// Persists rank updates as the rank property of their vertex rows.
///
/// Every update is an overwrite, so re-running an import with the same batch
/// leaves the table in the same state. The first failed write aborts the
/// import; the job as a whole is then reported as failed.
pub struct RankImportWriter<'g, S: KvStore> {
    graph: &'g GraphStore<S>,
    metrics: Arc<dyn JobMetrics>,
    written: u64,
}

impl<'g, S: KvStore> RankImportWriter<'g, S> {
    /// Writes through `graph`.
    pub fn new(graph: &'g GraphStore<S>) -> Self {
        Self {
            graph,
            metrics: default_metrics(),
            written: 0,
        }
    }

    /// Counts persisted ranks into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<dyn JobMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Persists one update.
    pub fn write(&mut self, update: &RankUpdate) -> Result<()> {
        self.graph.put_rank(&update.vertex, update.rank)?;
        self.metrics.rank_written();
        self.written += 1;
        Ok(())
    }

    /// Persists every update from `updates`, stopping at the first error.
    pub fn write_all<I>(&mut self, updates: I) -> Result<()>
    where
        I: IntoIterator<Item = Result<RankUpdate>>,
    {
        for update in updates {
            self.write(&update?)?;
        }
        Ok(())
    }

    /// Streams a batch file into the vertex table.
    pub fn import_file(&mut self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "rank.import.file");
        self.write_all(read_batch(path)?)
    }

    /// Ends the import.
    pub fn finish(self) -> ImportSummary {
        ImportSummary {
            written: self.written,
        }
    }
}

/// Imports the batch file at `input` into the vertex table of `config`.
///
/// The configuration is checked before the store is touched.
pub fn run_import<P: StoreProvider>(
    provider: &P,
    config: &GraphConfig,
    input: &Path,
) -> Result<ImportSummary> {
    let graph = GraphStore::open(provider, config)?;
    let mut writer = RankImportWriter::new(&graph);
    writer.import_file(input)?;
    let summary = writer.finish();
    info!(
        table = %config.vertex_table,
        written = summary.written,
        "rank.import.done"
    );
    Ok(summary)
}
