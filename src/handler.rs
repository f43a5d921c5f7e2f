//! Data Handler
//!
//! One configured endpoint. Serves a request end to end:
//!
//! ```text
//! RequestParams → QuerySpec → aggregate policy → registry → adapter → render
//! ```
//!
//! Handlers are immutable after construction and share one
//! [`ConnectionRegistry`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backend::{BackendConfig, ConnectionRegistry};
use crate::query::{
    OutputFormat, QueryError, QueryOverrides, QueryResult, QuerySpec, RequestParams,
};
use crate::render::{render, RenderedResponse};

/// What to do with aggregates when no group-by column is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregatePolicy {
    /// Drop the aggregates and run a plain query
    #[default]
    Ignore,
    /// Fail with `AggregationWithoutGroupBy`
    Reject,
}

impl AggregatePolicy {
    /// Apply the policy to a freshly built spec
    pub fn apply(self, mut spec: QuerySpec) -> QueryResult<QuerySpec> {
        if spec.group_by.is_empty() && !spec.aggregates.is_empty() {
            match self {
                Self::Ignore => {
                    tracing::debug!(
                        count = spec.aggregates.len(),
                        "Dropping aggregates without groupby"
                    );
                    spec.aggregates.clear();
                }
                Self::Reject => return Err(QueryError::AggregationWithoutGroupBy),
            }
        }
        Ok(spec)
    }
}

/// A validated endpoint definition
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub name: String,
    pub backend: BackendConfig,
    pub overrides: QueryOverrides,
    /// Response header overrides, applied last
    pub headers: BTreeMap<String, String>,
    pub aggregate_policy: AggregatePolicy,
}

impl DataSource {
    pub fn new(name: impl Into<String>, backend: BackendConfig) -> Self {
        Self {
            name: name.into(),
            backend,
            overrides: QueryOverrides::default(),
            headers: BTreeMap::new(),
            aggregate_policy: AggregatePolicy::default(),
        }
    }

    pub fn overrides(mut self, overrides: QueryOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn aggregate_policy(mut self, policy: AggregatePolicy) -> Self {
        self.aggregate_policy = policy;
        self
    }
}

/// Serves requests for one endpoint
#[derive(Clone)]
pub struct DataHandler {
    source: DataSource,
    registry: Arc<ConnectionRegistry>,
}

impl DataHandler {
    pub fn new(source: DataSource, registry: Arc<ConnectionRegistry>) -> Self {
        Self { source, registry }
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    /// Build the spec a request would run, after the aggregate policy
    ///
    /// Fails before any backend work when no requested format is supported.
    pub fn plan(&self, params: &RequestParams) -> QueryResult<QuerySpec> {
        let spec = self.source.overrides.build_spec(params)?;
        let spec = self.source.aggregate_policy.apply(spec)?;
        if OutputFormat::choose(&spec.formats).is_none() {
            return Err(QueryError::UnsupportedFormat(spec.formats));
        }
        Ok(spec)
    }

    /// Run one request and serialize the result
    ///
    /// Blocking: backend execution happens on the calling thread.
    pub fn handle(&self, params: &RequestParams) -> QueryResult<RenderedResponse> {
        let spec = self.plan(params)?;
        let connection = self.registry.get_connection(&self.source.backend)?;
        let table = connection.execute(&self.source.backend.table, &spec)?;

        tracing::debug!(
            endpoint = %self.source.name,
            rows = table.len(),
            "Query executed"
        );

        render(&table, &spec.formats, &self.source.headers)
    }
}
