//! Relational Backend - SQLite through rusqlite
//!
//! Builds one parameterized `SELECT` per request. Identifiers are quoted and
//! checked against the reflected table; filter values are always bound.
//!
//! # Generated SQL
//!
//! ```text
//! SELECT "country", SUM("count") AS "total"
//! FROM "flags"
//! WHERE "count" > ? AND lower("name") LIKE lower(?) ESCAPE '\'
//! GROUP BY "country"
//! ORDER BY "total" DESC
//! LIMIT 4 OFFSET 3
//! ```

use rusqlite::{params_from_iter, Connection, OpenFlags};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Adapter, ResultTable, TableMeta, Value};
use crate::query::{AggregateOp, Operator, QueryError, QueryResult, QuerySpec, SortDirection};

/// Shared SQLite connection; the mutex serializes statements across requests
#[derive(Debug, Clone)]
pub struct SqliteHandle {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHandle {
    /// Open a database from a `sqlite://` URL or a bare path
    ///
    /// Supported parameters: `read_only` (bool) and `busy_timeout_ms` (integer).
    pub fn open(
        url: &str,
        parameters: &BTreeMap<String, serde_json::Value>,
    ) -> QueryResult<Self> {
        let mut read_only = false;
        let mut busy_timeout = None;

        for (key, value) in parameters {
            match key.as_str() {
                "read_only" => {
                    read_only = value.as_bool().ok_or_else(|| invalid(key, value))?;
                }
                "busy_timeout_ms" => {
                    busy_timeout = Some(value.as_u64().ok_or_else(|| invalid(key, value))?);
                }
                _ => {
                    tracing::warn!(parameter = %key, "Ignoring unknown sqlite parameter");
                }
            }
        }

        let conn = match sqlite_path(url) {
            None => Connection::open_in_memory()?,
            Some(path) if read_only => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
            Some(path) => Connection::open(path)?,
        };

        if let Some(ms) = busy_timeout {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }

        Ok(Self::from_connection(conn))
    }

    /// Wrap an already open connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` with exclusive access to the connection
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> QueryResult<T>) -> QueryResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| QueryError::Lock(e.to_string()))?;
        f(&conn)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.conn, &other.conn)
    }
}

fn invalid(key: &str, value: &serde_json::Value) -> QueryError {
    QueryError::InvalidParameter {
        name: key.to_string(),
        value: value.to_string(),
    }
}

/// Database path for a URL; `None` means in-memory
///
/// `sqlite:///data.db` is relative, `sqlite:////var/data.db` absolute.
fn sqlite_path(url: &str) -> Option<&str> {
    let path = match url.strip_prefix("sqlite://") {
        Some(rest) => rest.strip_prefix('/').unwrap_or(rest),
        None => url,
    };

    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

/// Quote an identifier for SQLite
fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// A generated statement and its bound values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<String>,
}

/// Adapter for one table of a SQLite database
pub struct RelationalAdapter {
    handle: SqliteHandle,
    table: String,
}

impl RelationalAdapter {
    pub fn new(handle: SqliteHandle, table: impl Into<String>) -> Self {
        Self {
            handle,
            table: table.into(),
        }
    }

    /// Select list as (output name, expression) pairs
    fn select_list(
        &self,
        spec: &QuerySpec,
        meta: &TableMeta,
    ) -> QueryResult<Vec<(String, String)>> {
        if spec.is_aggregated() {
            let mut items = Vec::new();
            for column in &spec.group_by {
                meta.require(column)?;
                items.push((column.clone(), quote(column)));
            }
            for agg in &spec.aggregates {
                meta.require(&agg.column)?;
                let column = quote(&agg.column);
                let expr = match agg.op {
                    AggregateOp::Min => format!("MIN({column})"),
                    AggregateOp::Max => format!("MAX({column})"),
                    AggregateOp::Sum => format!("SUM({column})"),
                    AggregateOp::Count => format!("COUNT({column})"),
                    AggregateOp::Mean => format!("AVG({column})"),
                    AggregateOp::NUnique => format!("COUNT(DISTINCT {column})"),
                };
                items.push((agg.name.clone(), format!("{expr} AS {}", quote(&agg.name))));
            }
            Ok(items)
        } else if spec.selects.is_empty() {
            Ok(meta
                .columns
                .iter()
                .map(|c| (c.clone(), quote(c)))
                .collect())
        } else {
            spec.selects
                .iter()
                .map(|c| {
                    meta.require(c)?;
                    Ok((c.clone(), quote(c)))
                })
                .collect()
        }
    }
}

/// Output names kept after aggregation, in `selects` order
///
/// `None` when every aggregation output is returned.
fn aggregate_projection(
    spec: &QuerySpec,
    items: &[(String, String)],
) -> QueryResult<Option<Vec<String>>> {
    if !spec.is_aggregated() || spec.selects.is_empty() {
        return Ok(None);
    }

    let projected: Vec<String> = spec
        .selects
        .iter()
        .filter(|name| items.iter().any(|(n, _)| n == *name))
        .cloned()
        .collect();
    if projected.is_empty() {
        return Err(QueryError::InvalidParameter {
            name: "select".to_string(),
            value: spec.selects.join(","),
        });
    }
    Ok(Some(projected))
}

/// Escape `LIKE` wildcards so the value matches literally under `ESCAPE '\'`
fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Adapter for RelationalAdapter {
    type Query = SqlQuery;

    fn table_meta(&self) -> QueryResult<TableMeta> {
        let columns = self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(&self.table)))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(names)
        })?;

        if columns.is_empty() {
            return Err(QueryError::Backend(format!("no such table: {}", self.table)));
        }

        Ok(TableMeta {
            table: self.table.clone(),
            columns,
        })
    }

    fn build_query(&self, spec: &QuerySpec, meta: &TableMeta) -> QueryResult<SqlQuery> {
        let items = self.select_list(spec, meta)?;
        let exprs: Vec<&str> = items.iter().map(|(_, expr)| expr.as_str()).collect();

        let mut sql = format!("SELECT {} FROM {}", exprs.join(", "), quote(&self.table));
        let mut params = Vec::new();

        if !spec.wheres.is_empty() {
            let mut clauses = Vec::new();
            for pred in &spec.wheres {
                meta.require(&pred.column)?;
                let column = quote(&pred.column);
                let clause = match pred.op {
                    Operator::Eq => format!("{column} = ?"),
                    Operator::Ne => format!("{column} != ?"),
                    Operator::Gt => format!("{column} > ?"),
                    Operator::Ge => format!("{column} >= ?"),
                    Operator::Lt => format!("{column} < ?"),
                    Operator::Le => format!("{column} <= ?"),
                    Operator::Contains => format!("lower({column}) LIKE lower(?) ESCAPE '\\'"),
                    Operator::NotContains => {
                        format!("lower({column}) NOT LIKE lower(?) ESCAPE '\\'")
                    }
                };
                let value = match pred.op {
                    Operator::Contains | Operator::NotContains => {
                        format!("%{}%", escape_like(&pred.value))
                    }
                    _ => pred.value.clone(),
                };
                clauses.push(clause);
                params.push(value);
            }
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if spec.is_aggregated() {
            let groups: Vec<String> = spec.group_by.iter().map(|g| quote(g)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        // Projection wraps the aggregate so sorting still sees every output
        if let Some(names) = aggregate_projection(spec, &items)? {
            let columns: Vec<String> = names.iter().map(|n| quote(n)).collect();
            sql = format!("SELECT {} FROM ({sql})", columns.join(", "));
        }

        if !spec.sorts.is_empty() {
            let mut keys = Vec::new();
            for sort in &spec.sorts {
                let is_output = items.iter().any(|(name, _)| name == &sort.column);
                if spec.is_aggregated() && !is_output {
                    return Err(QueryError::UnknownColumn {
                        table: meta.table.clone(),
                        column: sort.column.clone(),
                    });
                } else if !is_output {
                    meta.require(&sort.column)?;
                }
                let direction = match sort.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                keys.push(format!("{} {direction}", quote(&sort.column)));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys.join(", "));
        }

        match (spec.limit, spec.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        tracing::debug!(sql = %sql, params = ?params, "Built SQL query");
        Ok(SqlQuery { sql, params })
    }

    fn execute(&self, query: SqlQuery) -> QueryResult<ResultTable> {
        self.handle.with_conn(|conn| {
            let mut stmt = conn.prepare(&query.sql)?;
            let columns: Vec<String> = stmt
                .column_names()
                .into_iter()
                .map(String::from)
                .collect();
            let width = columns.len();

            let mut rows = Vec::new();
            let mut cursor = stmt.query(params_from_iter(query.params.iter()))?;
            while let Some(row) = cursor.next()? {
                let mut values = Vec::with_capacity(width);
                for idx in 0..width {
                    values.push(Value::from(row.get_ref(idx)?));
                }
                rows.push(values);
            }

            Ok(ResultTable::new(columns, rows))
        })
    }
}
