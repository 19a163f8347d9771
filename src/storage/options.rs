use crate::types::{GraphError, Result};

/// Well-known property holding a vertex's rank.
pub const RANK_PROPERTY: &str = "pageRank";

/// Table identifiers a graph is mapped onto.
///
/// Built once by the caller and handed to every component constructor;
/// nothing in the crate reads table names from process-wide state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphConfig {
    /// Table holding one row per vertex.
    pub vertex_table: String,
    /// Table holding one row per edge.
    pub edge_table: String,
}

impl GraphConfig {
    /// Creates a configuration from the two table names.
    pub fn new(vertex_table: impl Into<String>, edge_table: impl Into<String>) -> Self {
        Self {
            vertex_table: vertex_table.into(),
            edge_table: edge_table.into(),
        }
    }

    /// Fails fast on missing or unusable table names.
    ///
    /// Called before any store handle is opened.
    pub fn validate(&self) -> Result<()> {
        if self.vertex_table.trim().is_empty() {
            return Err(GraphError::ConfigurationMissing("vertex table name".into()));
        }
        if self.edge_table.trim().is_empty() {
            return Err(GraphError::ConfigurationMissing("edge table name".into()));
        }
        validate_table_name(&self.vertex_table)?;
        validate_table_name(&self.edge_table)?;
        if self.vertex_table == self.edge_table {
            return Err(GraphError::Invalid(format!(
                "vertex and edge tables must differ (both '{}')",
                self.vertex_table
            )));
        }
        Ok(())
    }
}

/// Accepts only `[A-Za-z0-9_]+` identifiers.
pub fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(GraphError::ConfigurationMissing("table name".into()));
    }
    if !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(GraphError::Invalid(format!("table name '{name}' is not a plain identifier")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_names_are_missing_configuration() {
        let err = GraphConfig::new("", "edges").validate().unwrap_err();
        assert!(matches!(err, GraphError::ConfigurationMissing(_)));
        let err = GraphConfig::new("vertices", " ").validate().unwrap_err();
        assert!(matches!(err, GraphError::ConfigurationMissing(_)));
    }

    #[test]
    fn rejects_odd_identifiers_and_aliasing() {
        assert!(matches!(GraphConfig::new("v-1", "e").validate(), Err(GraphError::Invalid(_))));
        assert!(matches!(GraphConfig::new("g", "g").validate(), Err(GraphError::Invalid(_))));
        assert!(GraphConfig::new("vertex", "edge").validate().is_ok());
    }
}
