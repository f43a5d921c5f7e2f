//! Query error types
//!
//! Defines all error conditions that can occur while building and running a
//! table query. Malformed `where`/`agg` strings are not errors: the parsers
//! drop them.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Aggregate references an operator outside the fixed table
    #[error("Unknown aggregate operator: {0}")]
    UnknownAggregateOperator(String),

    /// Configured driver is neither relational nor array
    #[error("Unknown driver: {0}")]
    UnknownDriver(String),

    /// None of the requested formats is json, csv or html
    #[error("Unsupported format: {0:?}")]
    UnsupportedFormat(Vec<String>),

    /// Aggregates requested without any group-by column
    #[error("Aggregation requires at least one groupby column")]
    AggregationWithoutGroupBy,

    /// Column referenced by the request does not exist in the table
    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Request parameter value could not be interpreted
    #[error("Invalid value for {name}: {value}")]
    InvalidParameter { name: String, value: String },

    /// Connection, I/O or statement failure reported by the backend
    #[error("Backend error: {0}")]
    Backend(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl QueryError {
    /// Whether the error was caused by the request rather than the backend
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Backend(_) | Self::Lock(_) | Self::UnknownDriver(_))
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::Backend(err.to_string())
    }
}

impl From<csv::Error> for QueryError {
    fn from(err: csv::Error) -> Self {
        QueryError::Backend(err.to_string())
    }
}

impl From<std::io::Error> for QueryError {
    fn from(err: std::io::Error) -> Self {
        QueryError::Backend(err.to_string())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::UnknownAggregateOperator("median".to_string());
        assert_eq!(err.to_string(), "Unknown aggregate operator: median");

        let err = QueryError::UnknownColumn {
            table: "flags".to_string(),
            column: "colour".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown column 'colour' in table 'flags'");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(QueryError::AggregationWithoutGroupBy.is_client_error());
        assert!(QueryError::UnsupportedFormat(vec!["xml".into()]).is_client_error());
        assert!(!QueryError::Backend("disk I/O error".into()).is_client_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: QueryError = io_err.into();
        assert!(matches!(err, QueryError::Backend(_)));
    }
}
