#![forbid(unsafe_code)]
//! Identifiers and the crate-wide error type.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GraphError>;

/// Failures surfaced to the task boundary.
///
/// Nothing in the crate retries locally. Every variant is fatal to the task
/// that observes it; re-running the task is always safe because reads are
/// pure and rank writes are idempotent overwrites.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The key-value store could not be reached or returned an I/O failure.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// An edge or vertex key does not parse under the key codec.
    #[error("malformed key: {0}")]
    MalformedKey(String),
    /// A property qualifier carries an unknown or mismatched type tag.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    /// A required table or identifier name was not configured.
    #[error("configuration missing: {0}")]
    ConfigurationMissing(String),
    /// The caller violated an input contract.
    #[error("invalid argument: {0}")]
    Invalid(String),
    /// A rank batch file could not be read or written.
    #[error("rank batch error: {0}")]
    Batch(String),
}

impl From<io::Error> for GraphError {
    fn from(err: io::Error) -> Self {
        GraphError::StoreUnavailable(err.to_string())
    }
}

impl From<rusqlite::Error> for GraphError {
    fn from(err: rusqlite::Error) -> Self {
        GraphError::StoreUnavailable(err.to_string())
    }
}

impl From<csv::Error> for GraphError {
    fn from(err: csv::Error) -> Self {
        GraphError::Batch(err.to_string())
    }
}

/// Opaque vertex identifier, stored verbatim as the vertex row key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexId(Vec<u8>);

impl VertexId {
    /// Wraps raw key bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the id, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Borrows the id as UTF-8 when it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }
}

impl From<&str> for VertexId {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for VertexId {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

impl From<&[u8]> for VertexId {
    fn from(value: &[u8]) -> Self {
        Self(value.to_vec())
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Composite identifier of an edge row: `(source, label, destination)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeKey {
    /// Source vertex.
    pub source: VertexId,
    /// Edge label.
    pub label: String,
    /// Destination vertex.
    pub dest: VertexId,
}

impl EdgeKey {
    /// Builds an edge key from its three components.
    pub fn new(
        source: impl Into<VertexId>,
        label: impl Into<String>,
        dest: impl Into<VertexId>,
    ) -> Self {
        Self {
            source: source.into(),
            label: label.into(),
            dest: dest.into(),
        }
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.source, self.label, self.dest)
    }
}
