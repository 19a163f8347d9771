//! The sorted key-value boundary the graph layer is written against.
//!
//! Keys order lexicographically by raw bytes. A row is a set of
//! `(column, value)` cells; a row with no cells does not exist.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;

use crate::types::Result;

/// Cells of a single row, keyed by column qualifier.
pub type Cells = BTreeMap<Vec<u8>, Vec<u8>>;

/// One row returned by a get or scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    /// Row key.
    pub key: Vec<u8>,
    /// Column qualifier to value.
    pub cells: Cells,
}

impl Row {
    /// Builds a row from its key and cells.
    pub fn new(key: Vec<u8>, cells: Cells) -> Self {
        Self { key, cells }
    }

    /// Value stored under `column`, if any.
    pub fn get(&self, column: &[u8]) -> Option<&[u8]> {
        self.cells.get(column).map(Vec::as_slice)
    }

    /// True when the row carries no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Half-open key range: inclusive start, exclusive stop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanRange {
    /// Inclusive lower bound; empty means the start of the table.
    pub start: Vec<u8>,
    /// Exclusive upper bound; `None` means the end of the table.
    pub stop: Option<Vec<u8>>,
}

impl ScanRange {
    /// Every row in the table.
    pub fn all() -> Self {
        Self::default()
    }

    /// `[start, stop)`.
    pub fn new(start: Vec<u8>, stop: Vec<u8>) -> Self {
        Self {
            start,
            stop: Some(stop),
        }
    }

    /// True when `key` falls inside the range.
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.stop.as_deref().map_or(true, |stop| key < stop)
    }
}

/// Server-side column projection applied to scanned rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ColumnFilter {
    /// Return every cell.
    #[default]
    All,
    /// Return only the first cell of each row; used when only row keys matter.
    FirstCellOnly,
    /// Return only the listed columns. Rows left without cells are skipped.
    Columns(Vec<Vec<u8>>),
}

impl ColumnFilter {
    /// Projects `cells` through the filter.
    pub fn apply(&self, mut cells: Cells) -> Cells {
        match self {
            ColumnFilter::All => cells,
            ColumnFilter::FirstCellOnly => match cells.pop_first() {
                Some((col, val)) => Cells::from([(col, val)]),
                None => Cells::new(),
            },
            ColumnFilter::Columns(wanted) => {
                cells.retain(|col, _| wanted.iter().any(|w| w == col));
                cells
            }
        }
    }
}

/// Lazy, finite, single-pass sequence of rows.
pub type Scanner<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// A single table of a sorted key-value store.
///
/// A handle is owned by one worker task; handles are never shared across
/// tasks.
pub trait KvStore: Send {
    /// Table identifier this handle is bound to.
    fn table(&self) -> &str;

    /// Reads one row; `None` when no row exists or it has no cells.
    fn get(&self, key: &[u8]) -> Result<Option<Row>>;

    /// Writes one cell, overwriting any previous value at that column.
    fn put(&self, key: &[u8], column: &[u8], value: &[u8]) -> Result<()>;

    /// Scans `range` in key order, projecting each row through `filter`.
    fn scan(&self, range: ScanRange, filter: ColumnFilter) -> Result<Scanner<'_>>;
}

/// Hands out table handles; one handle per worker task.
pub trait StoreProvider: Send + Sync {
    /// Concrete table handle type.
    type Table: KvStore;

    /// Opens (creating when absent) the named table.
    fn open_table(&self, name: &str) -> Result<Self::Table>;
}

/// Rows fetched from the store in batches of `batch` rows.
///
/// `fetch(lower, stop, limit)` returns at most `limit` rows in key order that
/// satisfy `lower` and lie before `stop`; a short batch ends the scan. The
/// scanner resumes strictly after the last key fetched, so it never revisits a
/// row. The column filter is applied here, after the batch size is judged.
pub(crate) struct PagedScanner<F> {
    fetch: F,
    filter: ColumnFilter,
    lower: Bound<Vec<u8>>,
    stop: Option<Vec<u8>>,
    batch: usize,
    buffer: VecDeque<Row>,
    exhausted: bool,
}

impl<F> PagedScanner<F>
where
    F: FnMut(Bound<&[u8]>, Option<&[u8]>, usize) -> Result<Vec<Row>>,
{
    pub(crate) fn new(range: ScanRange, filter: ColumnFilter, batch: usize, fetch: F) -> Self {
        Self {
            fetch,
            filter,
            lower: Bound::Included(range.start),
            stop: range.stop,
            batch: batch.max(1),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn refill(&mut self) -> Result<()> {
        let lower = match &self.lower {
            Bound::Included(k) => Bound::Included(k.as_slice()),
            Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };
        let rows = (self.fetch)(lower, self.stop.as_deref(), self.batch)?;
        if rows.len() < self.batch {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.lower = Bound::Excluded(last.key.clone());
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl<F> Iterator for PagedScanner<F>
where
    F: FnMut(Bound<&[u8]>, Option<&[u8]>, usize) -> Result<Vec<Row>>,
{
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.buffer.is_empty() {
                if self.exhausted {
                    return None;
                }
                if let Err(err) = self.refill() {
                    self.exhausted = true;
                    return Some(Err(err));
                }
                continue;
            }
            let row = self.buffer.pop_front()?;
            let cells = self.filter.apply(row.cells);
            if !cells.is_empty() {
                return Some(Ok(Row::new(row.key, cells)));
            }
        }
    }
}
