#![forbid(unsafe_code)]

//! Engine configuration loaded from TOML.
//!
//! ```toml
//! log_sql = true
//! schema = "catalog.toml"
//!
//! [dialect]
//! preset = "sqlite"
//!
//! [access]
//! strict = true
//! local_zone = "tempZone"
//!
//! [results]
//! max_result_bytes = 1048576
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::catalog::definition::SchemaDefinition;
use crate::catalog::standard::standard_schema;
use crate::catalog::SchemaGraph;
use crate::query::{AccessSettings, Dialect, PaginationSyntax, QueryEngine, ResultSettings};
use crate::types::QueryError;

/// Dialect preset plus optional capability overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialectConfig {
    /// Preset name: `postgres`, `mysql`, `oracle` or `sqlite`.
    pub preset: String,
    /// Replaces the preset's string-length function used by `begin_of`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_function: Option<String>,
    /// Replaces the preset's offset syntax.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationSyntax>,
    /// Forces the separate total-count statement on or off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count_query: Option<bool>,
}

impl Default for DialectConfig {
    fn default() -> Self {
        Self {
            preset: "postgres".into(),
            length_function: None,
            pagination: None,
            count_query: None,
        }
    }
}

impl DialectConfig {
    /// Resolves the preset and applies the overrides.
    pub fn resolve(&self) -> Result<Dialect, ConfigError> {
        let mut dialect = Dialect::preset(&self.preset).ok_or_else(|| ConfigError::UnknownDialect {
            name: self.preset.clone(),
        })?;
        if let Some(length) = &self.length_function {
            dialect.length_function = length.clone();
        }
        if let Some(pagination) = self.pagination {
            dialect.pagination = pagination;
        }
        if let Some(count_query) = self.count_query {
            dialect.count_query = count_query;
        }
        Ok(dialect)
    }
}

/// Everything needed to build a [`QueryEngine`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// SQL dialect of the backing database.
    pub dialect: DialectConfig,
    /// Access-control policy for compiled queries.
    pub access: AccessSettings,
    /// Result buffer sizing and byte cap.
    pub results: ResultSettings,
    /// Log compiled SQL at debug level under the `genquery::sql` target.
    pub log_sql: bool,
    /// Schema definition file; the built-in standard schema when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
}

impl EngineConfig {
    /// Loads `explicit`, or the default path. A missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit.map(Path::to_path_buf).or_else(default_config_path);
        match path {
            Some(path) if path.exists() => read_file(&path),
            Some(path) if explicit.is_some() => Err(ConfigError::Read {
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                path,
            }),
            _ => Ok(Self::default()),
        }
    }

    /// Parses a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })
    }

    /// Loads the configured schema definition, or the standard schema.
    pub fn load_schema(&self) -> Result<SchemaGraph, ConfigError> {
        let graph = match &self.schema {
            Some(path) => SchemaDefinition::load(path)?.build()?,
            None => standard_schema()?,
        };
        Ok(graph)
    }

    /// Builds an engine from this configuration.
    pub fn build_engine(&self) -> Result<QueryEngine, ConfigError> {
        let dialect = self.dialect.resolve()?;
        let schema = self.load_schema()?;
        debug!(dialect = %dialect, tables = schema.tables().len(), "config.build_engine");
        Ok(QueryEngine::new(schema, dialect)?
            .with_access(self.access.clone())
            .with_results(self.results)
            .with_sql_logging(self.log_sql))
    }
}

fn read_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Errors raised while loading configuration or building an engine from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`EngineConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that failed, or `<inline>` for strings.
        path: PathBuf,
        /// Underlying TOML error.
        source: toml::de::Error,
    },
    /// The dialect preset is not one of the built-in names.
    #[error("unknown dialect '{name}' (expected postgres, mysql, oracle or sqlite)")]
    UnknownDialect {
        /// Preset as written.
        name: String,
    },
    /// Loading the schema or building the engine failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// `<config dir>/genquery/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("genquery").join("config.toml"))
}
