#![forbid(unsafe_code)]

//! Command-line support: loading edge lists and the error type shared by the
//! `rowgraph` binary.

/// Edge-list loading from CSV.
pub mod load;

use thiserror::Error;

use crate::types::GraphError;

pub use load::{load_edge_file, load_edges, EdgeLoadConfig, LoadSummary, VERTEX_ID_PROPERTY};

/// Error type for CLI operations.
#[derive(Error, Debug)]
pub enum CliError {
    /// Generic error message.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// CSV parsing error.
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// Graph or store error.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Configuration file could not be parsed.
    #[error("config: {0}")]
    Config(String),
}

impl From<&str> for CliError {
    fn from(value: &str) -> Self {
        CliError::Message(value.to_string())
    }
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}
