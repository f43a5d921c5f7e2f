//! Result table types
//!
//! Backend-neutral cells and tables. Both adapters produce a [`ResultTable`];
//! the renderer consumes it.

use rusqlite::types::ValueRef;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// A single cell value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Infer a typed value from a raw text cell
    pub fn infer(raw: &str) -> Self {
        if raw.is_empty() {
            Self::Null
        } else if let Ok(i) = raw.parse::<i64>() {
            Self::Integer(i)
        } else if let Ok(f) = raw.parse::<f64>() {
            Self::Real(f)
        } else {
            Self::Text(raw.to_string())
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of the value, if it is a number
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
            Self::Null | Self::Text(_) => None,
        }
    }

    /// Total order used for sorting and grouping: null < numbers < text
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Null, _) => Ordering::Less,
            (_, Self::Null) => Ordering::Greater,
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Text(_), _) => Ordering::Greater,
            (_, Self::Text(_)) => Ordering::Less,
            (a, b) => {
                let (a, b) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                a.total_cmp(&b)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(r) => write!(f, "{r}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                Self::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Ordered columns and rows produced by one query execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    /// Column names in output order
    pub columns: Vec<String>,
    /// Rows, each with one value per column
    pub rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// Create a table from columns and rows
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Get the number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, top to bottom
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("42"), Value::Integer(42));
        assert_eq!(Value::infer("4.5"), Value::Real(4.5));
        assert_eq!(Value::infer("US"), Value::Text("US".to_string()));
    }

    #[test]
    fn test_total_cmp_orders_kinds() {
        assert_eq!(Value::Null.total_cmp(&Value::Integer(0)), Ordering::Less);
        assert_eq!(Value::Integer(2).total_cmp(&Value::Real(1.5)), Ordering::Greater);
        assert_eq!(Value::Integer(1).total_cmp(&Value::Real(1.0)), Ordering::Equal);
        assert_eq!(Value::Real(9.0).total_cmp(&Value::from("a")), Ordering::Less);
        assert_eq!(Value::from("a").total_cmp(&Value::from("b")), Ordering::Less);
    }

    #[test]
    fn test_serialize_untagged() {
        let row = vec![Value::Null, Value::Integer(3), Value::Real(1.5), Value::from("x")];
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"[null,3,1.5,"x"]"#);
    }

    #[test]
    fn test_column_lookup() {
        let table = ResultTable::new(
            vec!["id".into(), "country".into()],
            vec![
                vec![Value::Integer(1), Value::from("US")],
                vec![Value::Integer(2), Value::from("FR")],
            ],
        );

        assert_eq!(table.column_index("country"), Some(1));
        assert_eq!(
            table.column("id").unwrap(),
            vec![&Value::Integer(1), &Value::Integer(2)]
        );
        assert!(table.column("missing").is_none());
    }
}
