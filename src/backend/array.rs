//! Array Backend - in-memory columnar frames
//!
//! Loads a delimited file once into a column-major [`Frame`] and evaluates
//! queries directly over it:
//!
//! ```text
//! filter → group + aggregate → sort → slice(offset, offset + limit) → project
//! ```
//!
//! Values compare numerically when both sides are numbers and as text
//! otherwise. Null cells never satisfy a predicate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Adapter, ResultTable, TableMeta, Value};
use crate::query::{
    Aggregate, AggregateOp, Operator, Predicate, QueryError, QueryResult, QuerySpec, Sort,
    SortDirection,
};

/// Column-major in-memory table
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    name: String,
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
    rows: usize,
}

impl Frame {
    /// Build a frame from column names and column vectors of equal length
    pub fn new(name: impl Into<String>, columns: Vec<String>, data: Vec<Vec<Value>>) -> Self {
        let rows = data.first().map(Vec::len).unwrap_or(0);
        Self {
            name: name.into(),
            columns,
            data,
            rows,
        }
    }

    /// Load a delimited file
    ///
    /// `url` names the file, or a directory holding `<table>.csv`.
    /// Supported parameters: `delimiter` (one character) and `has_headers` (bool).
    pub fn load(
        url: &str,
        table: &str,
        parameters: &BTreeMap<String, serde_json::Value>,
    ) -> QueryResult<Self> {
        let mut builder = csv::ReaderBuilder::new();
        builder.flexible(true);

        for (key, value) in parameters {
            match key.as_str() {
                "delimiter" => {
                    let delimiter = value
                        .as_str()
                        .filter(|d| d.len() == 1)
                        .ok_or_else(|| invalid(key, value))?;
                    builder.delimiter(delimiter.as_bytes()[0]);
                }
                "has_headers" => {
                    builder.has_headers(value.as_bool().ok_or_else(|| invalid(key, value))?);
                }
                _ => {
                    tracing::warn!(parameter = %key, "Ignoring unknown array parameter");
                }
            }
        }

        let path = frame_path(url, table);
        let name = if table.is_empty() {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        } else {
            table.to_string()
        };

        let mut reader = builder.from_path(&path)?;
        let frame = Self::read(name, &mut reader)?;

        tracing::info!(
            path = %path.display(),
            rows = frame.rows,
            columns = frame.columns.len(),
            "Loaded array frame"
        );
        Ok(frame)
    }

    /// Read all records, inferring one type per column
    fn read<R: std::io::Read>(name: String, reader: &mut csv::Reader<R>) -> QueryResult<Self> {
        let mut raw: Vec<Vec<String>> = Vec::new();
        let mut width = if reader.has_headers() {
            reader.headers()?.len()
        } else {
            0
        };

        for record in reader.records() {
            let record = record?;
            width = width.max(record.len());
            raw.push(record.iter().map(str::to_string).collect());
        }

        let columns: Vec<String> = if reader.has_headers() {
            let headers = reader.headers()?;
            (0..width)
                .map(|i| headers.get(i).map(str::to_string).unwrap_or_else(|| i.to_string()))
                .collect()
        } else {
            (0..width).map(|i| i.to_string()).collect()
        };

        let data = (0..width)
            .map(|col| {
                let cells: Vec<&str> = raw
                    .iter()
                    .map(|row| row.get(col).map(String::as_str).unwrap_or(""))
                    .collect();
                infer_column(&cells)
            })
            .collect();

        Ok(Self::new(name, columns, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    fn value(&self, column: usize, row: usize) -> &Value {
        &self.data[column][row]
    }
}

fn invalid(key: &str, value: &serde_json::Value) -> QueryError {
    QueryError::InvalidParameter {
        name: key.to_string(),
        value: value.to_string(),
    }
}

fn frame_path(url: &str, table: &str) -> PathBuf {
    let path = Path::new(url);
    if path.is_dir() && !table.is_empty() {
        path.join(format!("{table}.csv"))
    } else {
        path.to_path_buf()
    }
}

/// Integer if every cell is an integer, real if every cell is a number, else text
fn infer_column(cells: &[&str]) -> Vec<Value> {
    let present = || cells.iter().filter(|c| !c.is_empty());

    if present().all(|c| c.parse::<i64>().is_ok()) {
        cells.iter().map(|c| Value::infer(c)).collect()
    } else if present().all(|c| c.parse::<f64>().is_ok()) {
        cells
            .iter()
            .map(|c| c.parse::<f64>().map(Value::Real).unwrap_or(Value::Null))
            .collect()
    } else {
        cells
            .iter()
            .map(|c| {
                if c.is_empty() {
                    Value::Null
                } else {
                    Value::Text(c.to_string())
                }
            })
            .collect()
    }
}

/// Test one cell against a predicate value
fn matches(value: &Value, op: Operator, rhs: &str) -> bool {
    if value.is_null() {
        return false;
    }

    match op {
        Operator::Contains => contains_ci(value, rhs),
        Operator::NotContains => !contains_ci(value, rhs),
        _ => {
            let ordering = match (value.as_f64(), rhs.trim().parse::<f64>()) {
                (Some(lhs), Ok(rhs)) => lhs.partial_cmp(&rhs),
                _ => Some(value.to_string().as_str().cmp(rhs)),
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                Operator::Eq => ordering.is_eq(),
                Operator::Ne => ordering.is_ne(),
                Operator::Gt => ordering.is_gt(),
                Operator::Ge => ordering.is_ge(),
                Operator::Lt => ordering.is_lt(),
                Operator::Le => ordering.is_le(),
                Operator::Contains | Operator::NotContains => false,
            }
        }
    }
}

fn contains_ci(value: &Value, needle: &str) -> bool {
    value
        .to_string()
        .to_lowercase()
        .contains(&needle.to_lowercase())
}

/// Reduce one group's values
fn aggregate(op: AggregateOp, values: &[&Value]) -> Value {
    let present: Vec<&Value> = values.iter().copied().filter(|v| !v.is_null()).collect();

    match op {
        AggregateOp::Min => present
            .iter()
            .min_by(|a, b| a.total_cmp(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        AggregateOp::Max => present
            .iter()
            .max_by(|a, b| a.total_cmp(b))
            .map(|v| (*v).clone())
            .unwrap_or(Value::Null),
        AggregateOp::Count => Value::Integer(present.len() as i64),
        AggregateOp::NUnique => {
            let mut distinct = present.clone();
            distinct.sort_by(|a, b| a.total_cmp(b));
            distinct.dedup_by(|a, b| a.total_cmp(b).is_eq());
            Value::Integer(distinct.len() as i64)
        }
        AggregateOp::Sum => {
            let numbers: Vec<&Value> = present
                .into_iter()
                .filter(|v| v.as_f64().is_some())
                .collect();
            if numbers.is_empty() {
                return Value::Null;
            }
            let integers: Option<i64> = numbers.iter().try_fold(0i64, |acc, v| match v {
                Value::Integer(i) => acc.checked_add(*i),
                _ => None,
            });
            match integers {
                Some(total) => Value::Integer(total),
                None => Value::Real(numbers.iter().filter_map(|v| v.as_f64()).sum()),
            }
        }
        AggregateOp::Mean => {
            let numbers: Vec<f64> = present.iter().filter_map(|v| v.as_f64()).collect();
            if numbers.is_empty() {
                Value::Null
            } else {
                Value::Real(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
    }
}

/// Resolved, validated plan for one array query
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPlan {
    /// (column index, operator, value)
    filters: Vec<(usize, Operator, String)>,
    /// Group column indexes and aggregates; `None` for a plain scan
    grouping: Option<(Vec<usize>, Vec<(AggregateOp, usize)>)>,
    /// Columns of the intermediate table
    columns: Vec<String>,
    /// (intermediate column index, direction)
    sorts: Vec<(usize, SortDirection)>,
    offset: usize,
    end: Option<usize>,
    /// Intermediate column indexes to output, in order
    projection: Vec<usize>,
}

/// Adapter over one loaded frame
pub struct ArrayAdapter {
    frame: Arc<Frame>,
}

impl ArrayAdapter {
    pub fn new(frame: Arc<Frame>) -> Self {
        Self { frame }
    }

    fn resolve(&self, meta: &TableMeta, column: &str) -> QueryResult<usize> {
        meta.require(column)?;
        self.frame
            .columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| QueryError::UnknownColumn {
                table: meta.table.clone(),
                column: column.to_string(),
            })
    }

    fn resolve_filter(
        &self,
        meta: &TableMeta,
        pred: &Predicate,
    ) -> QueryResult<(usize, Operator, String)> {
        Ok((self.resolve(meta, &pred.column)?, pred.op, pred.value.clone()))
    }

    fn resolve_aggregate(
        &self,
        meta: &TableMeta,
        agg: &Aggregate,
    ) -> QueryResult<(AggregateOp, usize)> {
        Ok((agg.op, self.resolve(meta, &agg.column)?))
    }

    fn resolve_sort(
        &self,
        meta: &TableMeta,
        columns: &[String],
        sort: &Sort,
    ) -> QueryResult<(usize, SortDirection)> {
        columns
            .iter()
            .position(|c| c == &sort.column)
            .map(|idx| (idx, sort.direction))
            .ok_or_else(|| QueryError::UnknownColumn {
                table: meta.table.clone(),
                column: sort.column.clone(),
            })
    }

    /// Group the filtered rows and compute aggregates, ordered by group key
    fn grouped_rows(
        &self,
        rows: &[usize],
        keys: &[usize],
        aggs: &[(AggregateOp, usize)],
    ) -> Vec<Vec<Value>> {
        let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();

        let mut sorted = rows.to_vec();
        sorted.sort_by(|&a, &b| {
            keys.iter()
                .map(|&k| self.frame.value(k, a).total_cmp(self.frame.value(k, b)))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        for row in sorted {
            let key: Vec<Value> = keys.iter().map(|&k| self.frame.value(k, row).clone()).collect();
            let same_group = groups.last().is_some_and(|(last, _)| {
                last.iter().zip(&key).all(|(a, b)| a.total_cmp(b).is_eq())
            });
            if same_group {
                if let Some((_, members)) = groups.last_mut() {
                    members.push(row);
                }
            } else {
                groups.push((key, vec![row]));
            }
        }

        groups
            .into_iter()
            .map(|(mut key, members)| {
                for &(op, column) in aggs {
                    let values: Vec<&Value> =
                        members.iter().map(|&r| self.frame.value(column, r)).collect();
                    key.push(aggregate(op, &values));
                }
                key
            })
            .collect()
    }
}

impl Adapter for ArrayAdapter {
    type Query = ArrayPlan;

    fn table_meta(&self) -> QueryResult<TableMeta> {
        Ok(TableMeta {
            table: self.frame.name.clone(),
            columns: self.frame.columns.clone(),
        })
    }

    fn build_query(&self, spec: &QuerySpec, meta: &TableMeta) -> QueryResult<ArrayPlan> {
        let filters = spec
            .wheres
            .iter()
            .map(|p| self.resolve_filter(meta, p))
            .collect::<QueryResult<Vec<_>>>()?;

        let (grouping, columns) = if spec.is_aggregated() {
            let keys = spec
                .group_by
                .iter()
                .map(|g| self.resolve(meta, g))
                .collect::<QueryResult<Vec<_>>>()?;
            let aggs = spec
                .aggregates
                .iter()
                .map(|a| self.resolve_aggregate(meta, a))
                .collect::<QueryResult<Vec<_>>>()?;
            let columns = spec
                .group_by
                .iter()
                .cloned()
                .chain(spec.aggregates.iter().map(|a| a.name.clone()))
                .collect::<Vec<_>>();
            (Some((keys, aggs)), columns)
        } else {
            (None, self.frame.columns.clone())
        };

        let sorts = spec
            .sorts
            .iter()
            .map(|s| self.resolve_sort(meta, &columns, s))
            .collect::<QueryResult<Vec<_>>>()?;

        let projection = if spec.selects.is_empty() {
            (0..columns.len()).collect()
        } else if grouping.is_some() {
            let projected: Vec<usize> = spec
                .selects
                .iter()
                .filter_map(|s| columns.iter().position(|c| c == s))
                .collect();
            if projected.is_empty() {
                return Err(QueryError::InvalidParameter {
                    name: "select".to_string(),
                    value: spec.selects.join(","),
                });
            }
            projected
        } else {
            spec.selects
                .iter()
                .map(|s| self.resolve(meta, s))
                .collect::<QueryResult<Vec<_>>>()?
        };

        Ok(ArrayPlan {
            filters,
            grouping,
            columns,
            sorts,
            offset: spec.offset.unwrap_or(0),
            end: spec.slice_end(),
            projection,
        })
    }

    fn execute(&self, plan: ArrayPlan) -> QueryResult<ResultTable> {
        let frame = &self.frame;

        let selected: Vec<usize> = (0..frame.rows)
            .filter(|&row| {
                plan.filters
                    .iter()
                    .all(|(col, op, rhs)| matches(frame.value(*col, row), *op, rhs))
            })
            .collect();

        let mut rows: Vec<Vec<Value>> = match &plan.grouping {
            Some((keys, aggs)) => self.grouped_rows(&selected, keys, aggs),
            None => selected
                .iter()
                .map(|&row| {
                    (0..frame.columns.len())
                        .map(|c| frame.value(c, row).clone())
                        .collect()
                })
                .collect(),
        };

        if !plan.sorts.is_empty() {
            rows.sort_by(|a, b| {
                plan.sorts
                    .iter()
                    .map(|&(idx, direction)| {
                        let ordering = a[idx].total_cmp(&b[idx]);
                        match direction {
                            SortDirection::Asc => ordering,
                            SortDirection::Desc => ordering.reverse(),
                        }
                    })
                    .find(|o| o.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let start = plan.offset.min(rows.len());
        let end = plan.end.unwrap_or(rows.len()).clamp(start, rows.len());

        let columns = plan
            .projection
            .iter()
            .map(|&idx| plan.columns[idx].clone())
            .collect();
        let rows = rows[start..end]
            .iter()
            .map(|row| plan.projection.iter().map(|&idx| row[idx].clone()).collect())
            .collect();

        Ok(ResultTable::new(columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::run;
    use std::io::Write;

    fn flags() -> ArrayAdapter {
        let frame = Frame::new(
            "flags",
            vec!["id".into(), "country".into(), "count".into()],
            vec![
                vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)],
                vec![Value::from("US"), Value::from("US"), Value::from("FR")],
                vec![Value::Integer(10), Value::Integer(20), Value::Integer(5)],
            ],
        );
        ArrayAdapter::new(Arc::new(frame))
    }

    fn numbered(n: i64) -> ArrayAdapter {
        let frame = Frame::new("n", vec!["i".into()], vec![(1..=n).map(Value::Integer).collect()]);
        ArrayAdapter::new(Arc::new(frame))
    }

    #[test]
    fn test_offset_and_limit_slice_exactly() {
        let spec = QuerySpec::new().offset(3).limit(4);
        let table = run(&numbered(10), &spec).unwrap();

        let values: Vec<_> = table.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            values,
            vec![Value::Integer(4), Value::Integer(5), Value::Integer(6), Value::Integer(7)]
        );
    }

    #[test]
    fn test_slice_past_end() {
        let table = run(&numbered(5), &QuerySpec::new().offset(4).limit(10)).unwrap();
        assert_eq!(table.len(), 1);

        let table = run(&numbered(5), &QuerySpec::new().offset(9)).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_group_sum_sorted_desc() {
        let spec = QuerySpec::new()
            .group_by(&["country"])
            .aggregate(Aggregate::new("total", AggregateOp::Sum, "count"))
            .sort("total", SortDirection::Desc);

        let table = run(&flags(), &spec).unwrap();
        assert_eq!(table.columns, vec!["country", "total"]);
        assert_eq!(
            table.rows,
            vec![
                vec![Value::from("US"), Value::Integer(30)],
                vec![Value::from("FR"), Value::Integer(5)],
            ]
        );
    }

    #[test]
    fn test_groups_ordered_by_key() {
        let spec = QuerySpec::new()
            .group_by(&["country"])
            .aggregate(Aggregate::new("n", AggregateOp::Count, "id"));

        let table = run(&flags(), &spec).unwrap();
        assert_eq!(table.rows[0][0], Value::from("FR"));
        assert_eq!(table.rows[1], vec![Value::from("US"), Value::Integer(2)]);
    }

    #[test]
    fn test_aggregate_functions() {
        let values = [Value::Integer(4), Value::Null, Value::Integer(2), Value::Integer(4)];
        let refs: Vec<&Value> = values.iter().collect();

        assert_eq!(aggregate(AggregateOp::Min, &refs), Value::Integer(2));
        assert_eq!(aggregate(AggregateOp::Max, &refs), Value::Integer(4));
        assert_eq!(aggregate(AggregateOp::Sum, &refs), Value::Integer(10));
        assert_eq!(aggregate(AggregateOp::Count, &refs), Value::Integer(3));
        assert_eq!(aggregate(AggregateOp::NUnique, &refs), Value::Integer(2));
        assert_eq!(aggregate(AggregateOp::Mean, &refs), Value::Real(10.0 / 3.0));
        assert_eq!(aggregate(AggregateOp::Sum, &[&Value::Null]), Value::Null);
    }

    #[test]
    fn test_sum_mixed_is_real() {
        let values = [Value::Integer(1), Value::Real(0.5)];
        let refs: Vec<&Value> = values.iter().collect();
        assert_eq!(aggregate(AggregateOp::Sum, &refs), Value::Real(1.5));
    }

    #[test]
    fn test_contains_case_insensitive() {
        let frame = Frame::new(
            "people",
            vec!["name".into()],
            vec![vec![
                Value::from("Bobby"),
                Value::from("ABOBX"),
                Value::from("alice"),
                Value::Null,
            ]],
        );
        let adapter = ArrayAdapter::new(Arc::new(frame));

        let spec = QuerySpec::new().filter(Predicate::new("name", Operator::Contains, "bob"));
        let table = run(&adapter, &spec).unwrap();
        assert_eq!(
            table.column("name").unwrap(),
            vec![&Value::from("Bobby"), &Value::from("ABOBX")]
        );

        let spec = QuerySpec::new().filter(Predicate::new("name", Operator::NotContains, "bob"));
        let table = run(&adapter, &spec).unwrap();
        assert_eq!(table.column("name").unwrap(), vec![&Value::from("alice")]);
    }

    #[test]
    fn test_numeric_and_text_comparison() {
        assert!(matches(&Value::Integer(10), Operator::Gt, "9"));
        assert!(matches(&Value::Real(2.5), Operator::Le, "2.5"));
        assert!(matches(&Value::Integer(3), Operator::Eq, "3.0"));
        assert!(matches(&Value::from("US"), Operator::Eq, "US"));
        assert!(matches(&Value::from("b"), Operator::Gt, "a"));
        assert!(!matches(&Value::Null, Operator::Ne, "x"));
    }

    #[test]
    fn test_select_order_is_preserved() {
        let spec = QuerySpec::new().select(&["count", "id"]).filter(Predicate::new(
            "country",
            Operator::Eq,
            "US",
        ));
        let table = run(&flags(), &spec).unwrap();
        assert_eq!(table.columns, vec!["count", "id"]);
        assert_eq!(table.rows[1], vec![Value::Integer(20), Value::Integer(2)]);
    }

    #[test]
    fn test_sort_by_unprojected_column() {
        let spec = QuerySpec::new()
            .select(&["country"])
            .sort("count", SortDirection::Asc);
        let table = run(&flags(), &spec).unwrap();
        assert_eq!(
            table.column("country").unwrap(),
            vec![&Value::from("FR"), &Value::from("US"), &Value::from("US")]
        );
    }

    #[test]
    fn test_unknown_column() {
        let spec = QuerySpec::new().filter(Predicate::new("colour", Operator::Eq, "red"));
        assert!(matches!(run(&flags(), &spec), Err(QueryError::UnknownColumn { .. })));
    }

    #[test]
    fn test_load_csv_infers_types() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flags.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "id,country,share").unwrap();
        writeln!(file, "1,US,0.5").unwrap();
        writeln!(file, "2,,1").unwrap();
        drop(file);

        let frame = Frame::load(path.to_str().unwrap(), "", &BTreeMap::new()).unwrap();
        assert_eq!(frame.name(), "flags");
        assert_eq!(frame.columns(), ["id", "country", "share"]);
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.value(0, 1), &Value::Integer(2));
        assert_eq!(frame.value(1, 1), &Value::Null);
        assert_eq!(frame.value(2, 1), &Value::Real(1.0));
    }

    #[test]
    fn test_load_from_directory_and_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cities.csv"), "name;pop\nParis;2100000\n").unwrap();

        let mut params = BTreeMap::new();
        params.insert("delimiter".to_string(), serde_json::json!(";"));

        let frame = Frame::load(dir.path().to_str().unwrap(), "cities", &params).unwrap();
        assert_eq!(frame.name(), "cities");
        assert_eq!(frame.columns(), ["name", "pop"]);
        assert_eq!(frame.value(1, 0), &Value::Integer(2_100_000));
    }

    #[test]
    fn test_load_missing_file() {
        let result = Frame::load("/definitely/not/here.csv", "", &BTreeMap::new());
        assert!(matches!(result, Err(QueryError::Backend(_))));
    }
}
