//! # Tablegate
//!
//! A declarative, read-only query service. Each configured endpoint maps URL
//! parameters onto a query against one table, runs it on a SQLite database or
//! an in-memory CSV frame, and returns the rows as JSON, CSV or HTML.
//!
//! ## Modules
//!
//! - [`query`]: URL vocabulary, parsers and the canonical query spec
//! - [`backend`]: Relational and array adapters, connection registry
//! - [`render`]: Result serialization
//! - [`handler`]: Per-endpoint request orchestration
//! - [`config`]: TOML configuration and endpoint validation
//! - [`api`]: REST API server with Axum
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tablegate::backend::{BackendConfig, ConnectionRegistry, DriverKind};
//! use tablegate::handler::{DataHandler, DataSource};
//! use tablegate::query::RequestParams;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend =
//!         BackendConfig::new(DriverKind::Relational, "sqlite:///data/tutorial.db", "flags");
//!     let handler = DataHandler::new(
//!         DataSource::new("flags", backend),
//!         Arc::new(ConnectionRegistry::new()),
//!     );
//!
//!     let params = RequestParams::parse("groupby=country&agg=total:sum(count)&sort=total:desc");
//!     let response = handler.handle(&params)?;
//!     println!("{}", response.body_text());
//!
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod backend;
pub mod cache;
pub mod config;
pub mod handler;
pub mod logging;
pub mod query;
pub mod render;

// Re-export top-level types for convenience
pub use query::{
    Aggregate, AggregateOp, Operator, OutputFormat, Predicate, QueryError, QueryOverrides,
    QueryResult, QuerySpec, RequestParams, Sort, SortDirection,
};

pub use backend::{
    BackendConfig, ConnectionHandle, ConnectionRegistry, DriverKind, ResultTable, Value,
};

pub use handler::{AggregatePolicy, DataHandler, DataSource};

pub use render::{render, RenderedResponse};

pub use cache::{FileCache, FileKind, Loaded};

pub use config::{Config, ConfigError, EndpointConfig, LoggingConfig, ServerConfig};

pub use api::{build_router, serve, ApiError, AppState};
