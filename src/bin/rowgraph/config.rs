use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use rowgraph::rank::SinkPolicy;

/// Settings read from `cli.toml`. Every field is optional; flags win.
#[derive(Debug, Default)]
pub struct CliConfig {
    path: Option<PathBuf>,
    data: RawConfig,
    sink_policy: Option<SinkPolicy>,
}

impl CliConfig {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let must_exist = explicit.is_some();
        let path = explicit.or_else(default_config_path);
        let data = match path.as_ref() {
            Some(config_path) if config_path.exists() => read_file(config_path)?,
            Some(config_path) if must_exist => {
                return Err(ConfigError::Missing {
                    path: config_path.clone(),
                })
            }
            _ => RawConfig::default(),
        };
        let sink_policy = match data.rank.sink_policy.as_deref() {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::InvalidSinkPolicy {
                value: value.to_string(),
            })?),
            None => None,
        };
        Ok(Self {
            path,
            data,
            sink_policy,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn db_path(&self) -> Option<&PathBuf> {
        self.data.database.path.as_ref()
    }

    pub fn vertex_table(&self) -> Option<&str> {
        self.data.tables.vertex.as_deref()
    }

    pub fn edge_table(&self) -> Option<&str> {
        self.data.tables.edge.as_deref()
    }

    pub fn partitions(&self) -> Option<usize> {
        self.data.rank.partitions
    }

    pub fn reducers(&self) -> Option<usize> {
        self.data.rank.reducers
    }

    pub fn damping(&self) -> Option<f64> {
        self.data.rank.damping
    }

    pub fn sink_policy(&self) -> Option<SinkPolicy> {
        self.sink_policy
    }

    pub fn scratch_dir(&self) -> Option<&PathBuf> {
        self.data.rank.scratch_dir.as_ref()
    }
}

fn read_file(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    tables: TablesSection,
    #[serde(default)]
    rank: RankSection,
}

#[derive(Debug, Default, Deserialize)]
struct DatabaseSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct TablesSection {
    vertex: Option<String>,
    edge: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RankSection {
    partitions: Option<usize>,
    reducers: Option<usize>,
    damping: Option<f64>,
    sink_policy: Option<String>,
    scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read CLI config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse CLI config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("CLI config {path} does not exist")]
    Missing { path: PathBuf },
    #[error("rank.sink_policy '{value}' is invalid (expected drop or redistribute)")]
    InvalidSinkPolicy { value: String },
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("rowgraph").join("cli.toml"))
}
