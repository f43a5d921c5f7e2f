//! Query Spec Builder
//!
//! Merges request parameters with an endpoint's configured overrides into a
//! [`QuerySpec`]. For every key the first non-empty source wins:
//!
//! ```text
//! config `query`  >  request parameters  >  config `default`  >  nothing
//! ```
//!
//! Configuration values may be written as lists, tables or scalars. They are
//! normalized into string lists once, when the endpoint is configured, so the
//! per-request path only ever sees [`ParamOverrides`].

use std::collections::BTreeMap;

use crate::config::ConfigError;
use crate::query::ast::{QuerySpec, Sort};
use crate::query::error::{QueryError, QueryResult};
use crate::query::parser::{parse_aggregate, parse_predicate};

pub const SELECT: &str = "select";
pub const WHERE: &str = "where";
pub const GROUP_BY: &str = "groupby";
pub const AGG: &str = "agg";
pub const SORT: &str = "sort";
pub const OFFSET: &str = "offset";
pub const LIMIT: &str = "limit";
pub const FORMAT: &str = "format";

/// Repeated URL parameters in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    /// Build from already-decoded pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Parse a raw query string such as `select=a&where=b%3E1`
    pub fn parse(query: &str) -> Self {
        let pairs = query
            .split('&')
            .filter(|part| !part.is_empty())
            .map(|part| {
                let (key, value) = part.split_once('=').unwrap_or((part, ""));
                (decode_component(key), decode_component(value))
            })
            .collect();
        Self { pairs }
    }

    /// All non-empty values for `key`, in request order
    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.pairs
            .iter()
            .filter(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Form-decode one query-string component; undecodable input is kept verbatim
fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Normalized parameter lists from one configuration table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamOverrides {
    values: BTreeMap<String, Vec<String>>,
}

impl ParamOverrides {
    /// Set the values for a key
    pub fn with(mut self, key: &str, values: &[&str]) -> Self {
        self.values
            .insert(key.to_string(), values.iter().map(|v| v.to_string()).collect());
        self
    }

    /// Values for `key`, if configured and non-empty
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.values
            .get(key)
            .map(Vec::as_slice)
            .filter(|values| !values.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Normalize a configuration table
    ///
    /// - list: each element as a string
    /// - table: keys for `select`/`groupby`, `key + value` for `where`,
    ///   `key + ':' + value` for `agg` and `sort`
    /// - scalar: a one-element list
    pub fn from_toml(table: &toml::Table) -> Result<Self, ConfigError> {
        let mut values = BTreeMap::new();

        for (key, value) in table {
            let list = match value {
                toml::Value::Array(items) => items
                    .iter()
                    .map(|item| scalar_to_string(key, item))
                    .collect::<Result<Vec<_>, _>>()?,
                toml::Value::Table(entries) => normalize_table(key, entries)?,
                scalar => vec![scalar_to_string(key, scalar)?],
            };
            values.insert(key.clone(), list);
        }

        Ok(Self { values })
    }
}

fn normalize_table(key: &str, entries: &toml::Table) -> Result<Vec<String>, ConfigError> {
    let delimiter = match key {
        SELECT | GROUP_BY => return Ok(entries.keys().cloned().collect()),
        WHERE => "",
        AGG | SORT => ":",
        _ => {
            return Err(ConfigError::InvalidOverride {
                key: key.to_string(),
                reason: "a table is only allowed for select, where, groupby, agg and sort"
                    .to_string(),
            })
        }
    };

    entries
        .iter()
        .map(|(column, value)| {
            Ok(format!("{column}{delimiter}{}", scalar_to_string(key, value)?))
        })
        .collect()
}

fn scalar_to_string(key: &str, value: &toml::Value) -> Result<String, ConfigError> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(b.to_string()),
        toml::Value::Datetime(dt) => Ok(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => Err(ConfigError::InvalidOverride {
            key: key.to_string(),
            reason: "nested lists and tables are not allowed".to_string(),
        }),
    }
}

/// An endpoint's `query` and `default` overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOverrides {
    /// Always wins over the request
    pub query: ParamOverrides,
    /// Used when the request does not supply a key
    pub default: ParamOverrides,
}

impl QueryOverrides {
    /// Create overrides from normalized tables
    pub fn new(query: ParamOverrides, default: ParamOverrides) -> Self {
        Self { query, default }
    }

    /// Resolve one key with `query > request > default` precedence
    pub fn resolve(&self, key: &str, params: &RequestParams) -> Vec<String> {
        if let Some(values) = self.query.get(key) {
            return values.to_vec();
        }

        let requested = params.get_all(key);
        if !requested.is_empty() {
            return requested;
        }

        self.default
            .get(key)
            .map(<[String]>::to_vec)
            .unwrap_or_default()
    }

    /// Build the canonical spec for one request
    pub fn build_spec(&self, params: &RequestParams) -> QueryResult<QuerySpec> {
        let wheres = self
            .resolve(WHERE, params)
            .iter()
            .filter_map(|w| parse_predicate(w))
            .collect();

        let mut aggregates = Vec::new();
        for agg in self.resolve(AGG, params) {
            if let Some(aggregate) = parse_aggregate(&agg)? {
                aggregates.push(aggregate);
            }
        }

        let sorts = self
            .resolve(SORT, params)
            .iter()
            .map(|s| Sort::parse(s))
            .collect();

        let mut formats = self.resolve(FORMAT, params);
        if formats.is_empty() {
            formats.push("json".to_string());
        }

        Ok(QuerySpec {
            selects: self.resolve(SELECT, params),
            wheres,
            group_by: self.resolve(GROUP_BY, params),
            aggregates,
            sorts,
            offset: self.first_usize(OFFSET, params)?,
            limit: self.first_usize(LIMIT, params)?,
            formats,
        })
    }

    /// First value of a single-valued integer key
    fn first_usize(&self, key: &str, params: &RequestParams) -> QueryResult<Option<usize>> {
        match self.resolve(key, params).first() {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| QueryError::InvalidParameter {
                    name: key.to_string(),
                    value: raw.clone(),
                }),
        }
    }
}
