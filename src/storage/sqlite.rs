//! SQLite-backed sorted table store.
//!
//! Each table identifier maps to one SQLite table of `(row, col, val)` BLOB
//! triples keyed by `(row, col)`. SQLite compares BLOBs with `memcmp`, which
//! gives the raw-byte key order adjacency scans rely on.

use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags};
use tracing::debug;

use crate::types::{GraphError, Result};

use super::kv::{Cells, ColumnFilter, KvStore, PagedScanner, Row, ScanRange, Scanner, StoreProvider};
use super::options::validate_table_name;

const DEFAULT_SCAN_BATCH: usize = 256;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens per-task connections onto one SQLite database file.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
    create_if_missing: bool,
    scan_batch: usize,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Store rooted at `path`; the file must already exist unless
    /// [`SqliteStore::create_if_missing`] is set.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            create_if_missing: false,
            scan_batch: DEFAULT_SCAN_BATCH,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    /// Allows the database file to be created on first open.
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets the number of rows fetched per scan batch.
    pub fn scan_batch(mut self, rows: usize) -> Self {
        self.scan_batch = rows.max(1);
        self
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        if !self.create_if_missing && !self.path.exists() {
            return Err(GraphError::StoreUnavailable(format!(
                "database {} does not exist",
                self.path.display()
            )));
        }
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(self.busy_timeout)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }
}

impl StoreProvider for SqliteStore {
    type Table = SqliteTable;

    fn open_table(&self, name: &str) -> Result<SqliteTable> {
        validate_table_name(name)?;
        let conn = self.connect()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{name}\" (
                row BLOB NOT NULL,
                col BLOB NOT NULL,
                val BLOB NOT NULL,
                PRIMARY KEY (row, col)
            ) WITHOUT ROWID"
        ))?;
        debug!(table = name, path = %self.path.display(), "sqlite.open_table");
        Ok(SqliteTable {
            name: name.to_owned(),
            conn,
            scan_batch: self.scan_batch,
        })
    }
}

/// One connection bound to one table.
pub struct SqliteTable {
    name: String,
    conn: Connection,
    scan_batch: usize,
}

impl SqliteTable {
    fn fetch_keys(
        &self,
        lower: Bound<&[u8]>,
        stop: Option<&[u8]>,
        limit: usize,
        first_cell_only: bool,
    ) -> Result<Vec<Row>> {
        let (lower_sql, lower_key): (&str, &[u8]) = match lower {
            Bound::Included(k) => ("row >= ?1", k),
            Bound::Excluded(k) => ("row > ?1", k),
            Bound::Unbounded => ("row >= ?1", b"".as_slice()),
        };
        let stop_sql = if stop.is_some() { "AND row < ?2" } else { "AND ?2 IS NULL" };
        let projection = if first_cell_only {
            "SELECT row, MIN(col), val"
        } else {
            "SELECT DISTINCT row, NULL, NULL"
        };
        let group = if first_cell_only { "GROUP BY row" } else { "" };
        let sql = format!(
            "{projection} FROM \"{}\" WHERE {lower_sql} {stop_sql} {group} \
             ORDER BY row LIMIT {limit}",
            self.name
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![lower_key, stop])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let key: Vec<u8> = r.get(0)?;
            let mut cells = Cells::new();
            if first_cell_only {
                cells.insert(r.get(1)?, r.get(2)?);
            }
            out.push(Row::new(key, cells));
        }
        Ok(out)
    }

    fn fill_cells(&self, rows: &mut [Row]) -> Result<()> {
        let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
            return Ok(());
        };
        let sql = format!(
            "SELECT row, col, val FROM \"{}\" WHERE row >= ?1 AND row <= ?2 ORDER BY row, col",
            self.name
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut result = stmt.query(params![first.key, last.key])?;
        let mut idx = 0usize;
        while let Some(r) = result.next()? {
            let key: Vec<u8> = r.get(0)?;
            while idx < rows.len() && rows[idx].key < key {
                idx += 1;
            }
            if idx == rows.len() {
                break;
            }
            if rows[idx].key == key {
                rows[idx].cells.insert(r.get(1)?, r.get(2)?);
            }
        }
        Ok(())
    }
}

impl KvStore for SqliteTable {
    fn table(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> Result<Option<Row>> {
        let sql = format!("SELECT col, val FROM \"{}\" WHERE row = ?1 ORDER BY col", self.name);
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![key])?;
        let mut cells = Cells::new();
        while let Some(r) = rows.next()? {
            cells.insert(r.get(0)?, r.get(1)?);
        }
        if cells.is_empty() {
            return Ok(None);
        }
        Ok(Some(Row::new(key.to_vec(), cells)))
    }

    fn put(&self, key: &[u8], column: &[u8], value: &[u8]) -> Result<()> {
        let sql = format!(
            "INSERT INTO \"{}\" (row, col, val) VALUES (?1, ?2, ?3)
             ON CONFLICT (row, col) DO UPDATE SET val = excluded.val",
            self.name
        );
        self.conn.prepare_cached(&sql)?.execute(params![key, column, value])?;
        Ok(())
    }

    fn scan(&self, range: ScanRange, filter: ColumnFilter) -> Result<Scanner<'_>> {
        let first_cell_only = filter == ColumnFilter::FirstCellOnly;
        let scanner = PagedScanner::new(range, filter, self.scan_batch, move |lower, stop, limit| {
            let mut rows = self.fetch_keys(lower, stop, limit, first_cell_only)?;
            if !first_cell_only {
                self.fill_cells(&mut rows)?;
            }
            Ok(rows)
        });
        Ok(Box::new(scanner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_database_is_unavailable() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("absent.db"));
        assert!(matches!(store.open_table("vertex"), Err(GraphError::StoreUnavailable(_))));
    }

    #[test]
    fn rejects_non_identifier_table_names() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("g.db")).create_if_missing(true);
        assert!(matches!(store.open_table("v\"; DROP"), Err(GraphError::Invalid(_))));
    }

    #[test]
    fn put_overwrites_cell() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("g.db")).create_if_missing(true);
        let table = store.open_table("vertex").unwrap();
        table.put(b"A", b"c", b"1").unwrap();
        table.put(b"A", b"c", b"2").unwrap();
        let row = table.get(b"A").unwrap().unwrap();
        assert_eq!(row.cells.len(), 1);
        assert_eq!(row.get(b"c"), Some(&b"2"[..]));
    }

    #[test]
    fn scans_page_through_batches() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("g.db"))
            .create_if_missing(true)
            .scan_batch(2);
        let table = store.open_table("edge").unwrap();
        for key in ["a", "b", "c", "d", "e"] {
            table.put(key.as_bytes(), b"x", b"1").unwrap();
            table.put(key.as_bytes(), b"y", b"2").unwrap();
        }
        let rows: Vec<Row> = table
            .scan(ScanRange::new(b"b".to_vec(), b"e".to_vec()), ColumnFilter::All)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.cells.len() == 2));

        let keys_only: Vec<Row> = table
            .scan(ScanRange::all(), ColumnFilter::FirstCellOnly)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(keys_only.len(), 5);
        assert!(keys_only.iter().all(|r| r.get(b"x").is_some() && r.cells.len() == 1));
    }
}
