use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::{GraphError, Result};

use super::kv::{Cells, ColumnFilter, KvStore, PagedScanner, Row, ScanRange, Scanner, StoreProvider};

const DEFAULT_SCAN_BATCH: usize = 128;

type Rows = BTreeMap<Vec<u8>, Cells>;

#[derive(Default)]
struct TableState {
    rows: RwLock<Rows>,
    fail_writes: AtomicUsize,
    unavailable: AtomicBool,
}

/// In-process sorted store. Tables are shared between handles of the same
/// `MemoryStore`, so writes through one handle are visible to all.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<BTreeMap<String, Arc<TableState>>>>,
    scan_batch: Option<usize>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides how many rows a scanner fetches per batch.
    pub fn with_scan_batch(mut self, batch: usize) -> Self {
        self.scan_batch = Some(batch);
        self
    }
}

impl StoreProvider for MemoryStore {
    type Table = MemoryTable;

    fn open_table(&self, name: &str) -> Result<MemoryTable> {
        let state = {
            let mut tables = self.tables.write();
            tables.entry(name.to_owned()).or_default().clone()
        };
        Ok(MemoryTable {
            name: name.to_owned(),
            state,
            scan_batch: self.scan_batch.unwrap_or(DEFAULT_SCAN_BATCH),
        })
    }
}

/// Handle onto one table of a [`MemoryStore`].
pub struct MemoryTable {
    name: String,
    state: Arc<TableState>,
    scan_batch: usize,
}

impl MemoryTable {
    /// Makes the next `n` writes fail with [`GraphError::StoreUnavailable`].
    pub fn fail_next_writes(&self, n: usize) {
        self.state.fail_writes.store(n, Ordering::SeqCst);
    }

    /// Toggles whether every operation on the table fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of rows currently stored.
    pub fn row_count(&self) -> usize {
        self.state.rows.read().len()
    }

    fn check_available(&self) -> Result<()> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(GraphError::StoreUnavailable(format!("table {} is offline", self.name)));
        }
        Ok(())
    }
}

impl KvStore for MemoryTable {
    fn table(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> Result<Option<Row>> {
        self.check_available()?;
        let rows = self.state.rows.read();
        Ok(rows
            .get(key)
            .filter(|cells| !cells.is_empty())
            .map(|cells| Row::new(key.to_vec(), cells.clone())))
    }

    fn put(&self, key: &[u8], column: &[u8], value: &[u8]) -> Result<()> {
        self.check_available()?;
        let injected = self
            .state
            .fail_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(GraphError::StoreUnavailable(format!(
                "injected write failure on table {}",
                self.name
            )));
        }
        self.state
            .rows
            .write()
            .entry(key.to_vec())
            .or_default()
            .insert(column.to_vec(), value.to_vec());
        Ok(())
    }

    fn scan(&self, range: ScanRange, filter: ColumnFilter) -> Result<Scanner<'_>> {
        self.check_available()?;
        let scanner = PagedScanner::new(range, filter, self.scan_batch, move |lower, stop, limit| {
            self.check_available()?;
            if let (Bound::Included(lo) | Bound::Excluded(lo), Some(stop)) = (lower, stop) {
                if lo >= stop {
                    return Ok(Vec::new());
                }
            }
            let upper = stop.map_or(Bound::Unbounded, Bound::Excluded);
            let rows = self.state.rows.read();
            Ok(rows
                .range::<[u8], _>((lower, upper))
                .filter(|(_, cells)| !cells.is_empty())
                .take(limit)
                .map(|(key, cells)| Row::new(key.clone(), cells.clone()))
                .collect())
        });
        Ok(Box::new(scanner))
    }
}
