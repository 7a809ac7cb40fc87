#![forbid(unsafe_code)]

//! Serializable schema definitions.
//!
//! A definition is the TOML form of a [`SchemaGraph`]:
//!
//! ```toml
//! [[tables]]
//! name = "r_data_meta_main"
//! alias = "r_meta_main r_data_meta_main"
//!
//! [[columns]]
//! id = 600
//! table = "r_data_meta_main"
//! name = "meta_attr_name"
//!
//! [[links]]
//! left = "r_data_metamap"
//! right = "r_data_meta_main"
//! predicate = "r_data_metamap.meta_id = r_data_meta_main.meta_id"
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::{ColumnId, QueryError, Result};

use super::{QueryConventions, SchemaGraph, SchemaLimits};

/// Table entry of a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table binding.
    pub name: String,
    /// FROM text; defaults to the name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alias: String,
    /// Whether exploration stops at this table.
    #[serde(default)]
    pub cycler: bool,
}

/// Column entry of a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Abstract column id.
    pub id: ColumnId,
    /// Owning table binding.
    pub table: String,
    /// Concrete column name.
    pub name: String,
}

/// Link entry of a schema definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDef {
    /// First endpoint.
    pub left: String,
    /// Second endpoint.
    pub right: String,
    /// Join predicate text.
    pub predicate: String,
}

/// Complete, serializable description of a schema graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDefinition {
    /// Optional registry caps.
    pub limits: SchemaLimits,
    /// Tables in registration order.
    pub tables: Vec<TableDef>,
    /// Columns in registration order.
    pub columns: Vec<ColumnDef>,
    /// Links in registration order; order decides traversal order.
    pub links: Vec<LinkDef>,
    /// Catalog-specific compilation rules.
    pub conventions: QueryConventions,
}

impl SchemaDefinition {
    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|err| QueryError::InvalidSchema {
            reason: err.to_string(),
        })
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| QueryError::InvalidSchema {
            reason: format!("failed to read {}: {err}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Renders the definition as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|err| QueryError::InvalidSchema {
            reason: err.to_string(),
        })
    }

    /// Captures an existing graph.
    pub fn from_graph(graph: &SchemaGraph) -> Self {
        let tables = graph
            .tables()
            .iter()
            .map(|t| TableDef {
                name: t.name.clone(),
                alias: if t.alias == t.name {
                    String::new()
                } else {
                    t.alias.clone()
                },
                cycler: t.cycler,
            })
            .collect();
        let columns = graph
            .columns()
            .iter()
            .map(|c| ColumnDef {
                id: c.id,
                table: graph.table(c.table).name.clone(),
                name: c.name.clone(),
            })
            .collect();
        let links = graph
            .links()
            .iter()
            .map(|l| LinkDef {
                left: graph.table(l.left).name.clone(),
                right: graph.table(l.right).name.clone(),
                predicate: l.predicate.clone(),
            })
            .collect();
        Self {
            limits: SchemaLimits::default(),
            tables,
            columns,
            links,
            conventions: graph.conventions().clone(),
        }
    }

    /// Registers everything into a new graph and validates it.
    pub fn build(&self) -> Result<SchemaGraph> {
        let mut graph = SchemaGraph::with_limits(self.limits);
        for table in &self.tables {
            graph.register_table(&table.name, &table.alias, table.cycler)?;
        }
        for column in &self.columns {
            graph.register_column(column.id, &column.table, &column.name)?;
        }
        for link in &self.links {
            graph.register_link(&link.left, &link.right, &link.predicate)?;
        }
        graph.set_conventions(self.conventions.clone())?;
        graph.validate()?;
        Ok(graph)
    }
}
