//! Tablegate Backends
//!
//! Executes a [`QuerySpec`] against a tabular datasource:
//!
//! - **relational**: SQLite databases through `rusqlite`, queried with
//!   generated, parameterized SQL
//! - **array**: delimited files loaded into an in-memory columnar [`Frame`]
//!   and queried without a SQL engine
//! - **registry**: process-wide cache of connection handles
//!
//! # Execution Pipeline
//!
//! ```text
//! BackendConfig → Registry → ConnectionHandle → Adapter
//!   → table_meta → build_query → execute → ResultTable
//! ```

mod array;
mod registry;
mod relational;
mod table;

pub use array::{ArrayAdapter, ArrayPlan, Frame};
pub use registry::ConnectionRegistry;
pub use relational::{RelationalAdapter, SqlQuery, SqliteHandle};
pub use table::{ResultTable, Value};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::query::{QueryError, QueryResult, QuerySpec};

/// Kind of backend engine behind an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// SQL database
    Relational,
    /// In-memory columnar frame
    Array,
}

impl DriverKind {
    /// Parse a configured driver name
    pub fn from_name(name: &str) -> QueryResult<Self> {
        match name.to_lowercase().as_str() {
            "relational" | "sqlalchemy" | "sqlite" => Ok(Self::Relational),
            "array" | "blaze" | "csv" => Ok(Self::Array),
            _ => Err(QueryError::UnknownDriver(name.to_string())),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Relational => write!(f, "relational"),
            Self::Array => write!(f, "array"),
        }
    }
}

/// Identifies one datasource connection target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendConfig {
    pub driver: DriverKind,
    pub url: String,
    pub table: String,
    /// Driver-specific connection parameters
    pub parameters: BTreeMap<String, serde_json::Value>,
}

impl BackendConfig {
    /// Create a config without connection parameters
    pub fn new(driver: DriverKind, url: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            driver,
            url: url.into(),
            table: table.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a connection parameter
    pub fn parameter(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Stable registry key; parameters serialize in key order
    pub fn cache_key(&self) -> QueryResult<String> {
        serde_json::to_string(self).map_err(|e| QueryError::Backend(e.to_string()))
    }
}

/// A shared, reference-counted backend connection
#[derive(Debug, Clone)]
pub enum ConnectionHandle {
    Relational(SqliteHandle),
    Array(Arc<Frame>),
}

impl ConnectionHandle {
    /// Open a new connection for `config`
    pub fn open(config: &BackendConfig) -> QueryResult<Self> {
        match config.driver {
            DriverKind::Relational => {
                SqliteHandle::open(&config.url, &config.parameters).map(Self::Relational)
            }
            DriverKind::Array => {
                Frame::load(&config.url, &config.table, &config.parameters)
                    .map(|frame| Self::Array(Arc::new(frame)))
            }
        }
    }

    /// Whether both handles share the same underlying connection
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Relational(a), Self::Relational(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Run `spec` against `table` with the adapter matching this handle
    pub fn execute(&self, table: &str, spec: &QuerySpec) -> QueryResult<ResultTable> {
        match self {
            Self::Relational(conn) => run(&RelationalAdapter::new(conn.clone(), table), spec),
            Self::Array(frame) => run(&ArrayAdapter::new(Arc::clone(frame)), spec),
        }
    }
}

/// Column names of the table an adapter queries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub table: String,
    pub columns: Vec<String>,
}

impl TableMeta {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Fail with `UnknownColumn` unless the column exists
    pub fn require(&self, column: &str) -> QueryResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(QueryError::UnknownColumn {
                table: self.table.clone(),
                column: column.to_string(),
            })
        }
    }
}

/// Translates a [`QuerySpec`] into a backend-native query and runs it
pub trait Adapter {
    /// Backend-native query representation
    type Query;

    /// Reflect the queried table's columns
    fn table_meta(&self) -> QueryResult<TableMeta>;

    /// Build the native query for `spec`
    fn build_query(&self, spec: &QuerySpec, meta: &TableMeta) -> QueryResult<Self::Query>;

    /// Execute a previously built query
    fn execute(&self, query: Self::Query) -> QueryResult<ResultTable>;
}

/// Reflect, build and execute in one step
pub fn run<A: Adapter>(adapter: &A, spec: &QuerySpec) -> QueryResult<ResultTable> {
    let meta = adapter.table_meta()?;
    let query = adapter.build_query(spec, &meta)?;
    adapter.execute(query)
}
