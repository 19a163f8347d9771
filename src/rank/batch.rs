use std::fs::{self, File};
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder, StringRecord, StringRecordsIntoIter, Writer, WriterBuilder};

use crate::types::{GraphError, Result, VertexId};

use super::RankUpdate;

const VERTEX_COLUMN: &str = "vertex";
const RANK_COLUMN: &str = "rank";
const HEX_PREFIX: &str = "0x";

/// Streams rank updates into a CSV file with a `vertex,rank` header.
///
/// Vertex ids are written verbatim when they are UTF-8 and do not start with
/// `0x`; every other id is written as `0x` followed by its bytes in hex.
pub struct RankBatchWriter {
    path: PathBuf,
    writer: Writer<File>,
    written: u64,
}

impl RankBatchWriter {
    /// Creates (or truncates) `path`, making parent directories as needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| batch_error(&path, err))?;
        }
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)?;
        writer.write_record([VERTEX_COLUMN, RANK_COLUMN])?;
        Ok(Self {
            path,
            writer,
            written: 0,
        })
    }

    /// Appends one record.
    pub fn write(&mut self, update: &RankUpdate) -> Result<()> {
        if !update.rank.is_finite() {
            return Err(GraphError::Batch(format!(
                "{}: rank for {} is not finite",
                self.path.display(),
                update.vertex
            )));
        }
        let vertex = encode_vertex(&update.vertex);
        let rank = update.rank.to_string();
        self.writer.write_record([vertex.as_str(), rank.as_str()])?;
        self.written += 1;
        Ok(())
    }

    /// Flushes the file and returns the number of records written.
    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush().map_err(|err| batch_error(&self.path, err))?;
        Ok(self.written)
    }
}

/// Writes `updates` to `path` in one go.
pub fn write_batch<'a>(
    path: impl AsRef<Path>,
    updates: impl IntoIterator<Item = &'a RankUpdate>,
) -> Result<u64> {
    let mut writer = RankBatchWriter::create(path)?;
    for update in updates {
        writer.write(update)?;
    }
    writer.finish()
}

/// Lazily reads rank updates back from a batch file.
pub struct RankBatchReader {
    path: PathBuf,
    records: StringRecordsIntoIter<File>,
    vertex_idx: usize,
    rank_idx: usize,
    line: u64,
}

impl RankBatchReader {
    /// Opens `path` and checks the header.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut reader: Reader<File> = ReaderBuilder::new()
            .trim(csv::Trim::Headers)
            .from_path(&path)
            .map_err(|err| GraphError::Batch(format!("{}: {err}", path.display())))?;
        let headers = reader.headers()?.clone();
        let vertex_idx = find_column(&path, &headers, VERTEX_COLUMN)?;
        let rank_idx = find_column(&path, &headers, RANK_COLUMN)?;
        Ok(Self {
            path,
            records: reader.into_records(),
            vertex_idx,
            rank_idx,
            line: 1,
        })
    }

    fn parse(&self, record: &StringRecord) -> Result<RankUpdate> {
        let vertex = record
            .get(self.vertex_idx)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| self.bad_line("missing vertex id"))?;
        let vertex = decode_vertex(vertex).map_err(|what| self.bad_line(&what))?;
        let raw = record
            .get(self.rank_idx)
            .map(str::trim)
            .ok_or_else(|| self.bad_line("missing rank"))?;
        let rank: f64 = raw
            .parse()
            .map_err(|_| self.bad_line(&format!("rank '{raw}' is not a number")))?;
        if !rank.is_finite() {
            return Err(self.bad_line(&format!("rank '{raw}' is not finite")));
        }
        Ok(RankUpdate { vertex, rank })
    }

    fn bad_line(&self, what: &str) -> GraphError {
        GraphError::Batch(format!("{} line {}: {what}", self.path.display(), self.line))
    }
}

impl Iterator for RankBatchReader {
    type Item = Result<RankUpdate>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        self.line += 1;
        Some(record.map_err(GraphError::from).and_then(|r| self.parse(&r)))
    }
}

/// Opens a batch file for streaming.
pub fn read_batch(path: impl AsRef<Path>) -> Result<RankBatchReader> {
    RankBatchReader::open(path)
}

fn encode_vertex(id: &VertexId) -> String {
    match id.as_str() {
        Some(text) if !text.starts_with(HEX_PREFIX) => text.to_owned(),
        _ => format!("{HEX_PREFIX}{}", hex::encode(id.as_bytes())),
    }
}

fn decode_vertex(field: &str) -> std::result::Result<VertexId, String> {
    match field.strip_prefix(HEX_PREFIX) {
        Some(digits) => hex::decode(digits)
            .map(VertexId::from_bytes)
            .map_err(|err| format!("vertex id '{field}' is not valid hex: {err}")),
        None => Ok(VertexId::from(field)),
    }
}

fn find_column(path: &Path, headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| GraphError::Batch(format!("{}: column '{name}' not found", path.display())))
}

fn batch_error(path: &Path, err: std::io::Error) -> GraphError {
    GraphError::Batch(format!("{}: {err}", path.display()))
}
