//! Query Abstract Syntax Tree
//!
//! Backend-agnostic description of one table request. A [`QuerySpec`] is
//! produced from URL parameters by the spec builder and consumed by either
//! backend adapter.
//!
//! # Example Requests
//!
//! ```text
//! ?select=country&select=count&where=count>10
//! ?groupby=country&agg=total:sum(count)&sort=total:desc
//! ?where=name~bob&offset=20&limit=10&format=csv
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A canonical query ready for execution
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    /// Output columns, empty for all columns
    pub selects: Vec<String>,
    /// Filters, combined with AND
    pub wheres: Vec<Predicate>,
    /// Group-by columns
    pub group_by: Vec<String>,
    /// Aggregates computed per group
    pub aggregates: Vec<Aggregate>,
    /// Sort keys, most significant first
    pub sorts: Vec<Sort>,
    /// Rows to skip
    pub offset: Option<usize>,
    /// Maximum number of rows
    pub limit: Option<usize>,
    /// Requested output format tags
    pub formats: Vec<String>,
}

impl QuerySpec {
    /// Start an empty spec that selects every column as JSON
    pub fn new() -> Self {
        Self {
            formats: vec!["json".to_string()],
            ..Default::default()
        }
    }

    /// Whether the aggregation path applies
    pub fn is_aggregated(&self) -> bool {
        !self.group_by.is_empty() && !self.aggregates.is_empty()
    }

    /// Add output columns
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.selects.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Add a filter
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.wheres.push(predicate);
        self
    }

    /// Add group-by columns
    pub fn group_by(mut self, columns: &[&str]) -> Self {
        self.group_by.extend(columns.iter().map(|c| c.to_string()));
        self
    }

    /// Add an aggregate
    pub fn aggregate(mut self, aggregate: Aggregate) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    /// Add a sort key
    pub fn sort(mut self, column: impl Into<String>, direction: SortDirection) -> Self {
        self.sorts.push(Sort::new(column, direction));
        self
    }

    /// Skip the first `n` rows
    pub fn offset(mut self, n: usize) -> Self {
        self.offset = Some(n);
        self
    }

    /// Return at most `n` rows
    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Replace the requested formats
    pub fn formats(mut self, formats: &[&str]) -> Self {
        self.formats = formats.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Exclusive end index for slicing, derived from offset and limit
    pub fn slice_end(&self) -> Option<usize> {
        self.limit
            .map(|limit| self.offset.unwrap_or(0).saturating_add(limit))
    }
}

/// Comparison operators usable in `where`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// `=` or `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `~`, case-insensitive substring match
    Contains,
    /// `!~`, case-insensitive substring exclusion
    NotContains,
}

impl Operator {
    /// Characters that may appear in an operator token
    pub const CHARS: &'static [char] = &['=', '>', '<', '!', '~'];

    /// Look up an operator token
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "=" | "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "~" => Some(Self::Contains),
            "!~" => Some(Self::NotContains),
            _ => None,
        }
    }

    /// Canonical token for this operator
    pub fn token(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Contains => "~",
            Self::NotContains => "!~",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A filter condition from one `where` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    /// Column to test
    pub column: String,
    /// Comparison operator
    pub op: Operator,
    /// Right-hand side, coerced by the backend
    pub value: String,
}

impl Predicate {
    /// Create a new predicate
    pub fn new(column: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.column, self.op, self.value)
    }
}

/// Aggregation functions usable in `agg`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Sum of values
    Sum,
    /// Count of non-null values
    Count,
    /// Arithmetic mean
    Mean,
    /// Count of distinct non-null values
    NUnique,
}

impl AggregateOp {
    /// Look up an operator name from the fixed table
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            "mean" => Some(Self::Mean),
            "nunique" => Some(Self::NUnique),
            _ => None,
        }
    }

    /// Name as written in requests
    pub fn name(&self) -> &'static str {
        match self {
            Self::Min => "min",
            Self::Max => "max",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Mean => "mean",
            Self::NUnique => "nunique",
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A labelled aggregate from one `agg` parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    /// Output column name
    pub name: String,
    /// Aggregation function
    pub op: AggregateOp,
    /// Source column
    pub column: String,
}

impl Aggregate {
    /// Create a new aggregate
    pub fn new(name: impl Into<String>, op: AggregateOp, column: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op,
            column: column.into(),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}({})", self.name, self.op, self.column)
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

impl Sort {
    /// Create a new sort key
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    /// Parse `column`, `column:asc` or `column:desc`; any other suffix sorts ascending
    pub fn parse(s: &str) -> Self {
        let (column, direction) = match s.split_once(':') {
            Some((column, dir)) if dir.eq_ignore_ascii_case("desc") => {
                (column, SortDirection::Desc)
            }
            Some((column, _)) => (column, SortDirection::Asc),
            None => (s, SortDirection::Asc),
        };
        Self::new(column, direction)
    }
}

/// Output formats in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Html,
}

impl OutputFormat {
    /// Known formats, highest priority first
    pub const PRIORITY: [OutputFormat; 3] = [Self::Json, Self::Csv, Self::Html];

    /// Tag used in the `format` parameter
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
        }
    }

    /// Pick the highest-priority known format present in `formats`
    pub fn choose(formats: &[String]) -> Option<Self> {
        Self::PRIORITY
            .into_iter()
            .find(|format| formats.iter().any(|f| f.eq_ignore_ascii_case(format.tag())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder_basic() {
        let spec = QuerySpec::new().select(&["country", "count"]).limit(5);

        assert_eq!(spec.selects, vec!["country", "count"]);
        assert_eq!(spec.limit, Some(5));
        assert_eq!(spec.formats, vec!["json"]);
        assert!(!spec.is_aggregated());
    }

    #[test]
    fn test_spec_is_aggregated_needs_both() {
        let agg = Aggregate::new("total", AggregateOp::Sum, "count");

        assert!(!QuerySpec::new().aggregate(agg.clone()).is_aggregated());
        assert!(!QuerySpec::new().group_by(&["country"]).is_aggregated());
        assert!(QuerySpec::new()
            .group_by(&["country"])
            .aggregate(agg)
            .is_aggregated());
    }

    #[test]
    fn test_slice_end() {
        assert_eq!(QuerySpec::new().offset(3).limit(4).slice_end(), Some(7));
        assert_eq!(QuerySpec::new().limit(4).slice_end(), Some(4));
        assert_eq!(QuerySpec::new().offset(3).slice_end(), None);
    }

    #[test]
    fn test_operator_tokens() {
        assert_eq!(Operator::from_token("=="), Some(Operator::Eq));
        assert_eq!(Operator::from_token("="), Some(Operator::Eq));
        assert_eq!(Operator::from_token("!~"), Some(Operator::NotContains));
        assert_eq!(Operator::from_token("=>"), None);
        assert_eq!(Operator::Ge.to_string(), ">=");
    }

    #[test]
    fn test_aggregate_op_table() {
        assert_eq!(AggregateOp::from_name("nunique"), Some(AggregateOp::NUnique));
        assert_eq!(AggregateOp::from_name("mean"), Some(AggregateOp::Mean));
        assert_eq!(AggregateOp::from_name("avg"), None);
    }

    #[test]
    fn test_sort_parse() {
        assert_eq!(Sort::parse("total:desc"), Sort::new("total", SortDirection::Desc));
        assert_eq!(Sort::parse("total:DESC"), Sort::new("total", SortDirection::Desc));
        assert_eq!(Sort::parse("total:asc"), Sort::new("total", SortDirection::Asc));
        assert_eq!(Sort::parse("total"), Sort::new("total", SortDirection::Asc));
        assert_eq!(Sort::parse("total:sideways"), Sort::new("total", SortDirection::Asc));
    }

    #[test]
    fn test_format_priority_ignores_request_order() {
        let formats = vec!["csv".to_string(), "json".to_string()];
        assert_eq!(OutputFormat::choose(&formats), Some(OutputFormat::Json));

        let formats = vec!["html".to_string(), "csv".to_string()];
        assert_eq!(OutputFormat::choose(&formats), Some(OutputFormat::Csv));

        let formats = vec!["xml".to_string()];
        assert_eq!(OutputFormat::choose(&formats), None);
    }

    #[test]
    fn test_display_round_trip_forms() {
        let pred = Predicate::new("name", Operator::Contains, "bob");
        assert_eq!(pred.to_string(), "name~bob");

        let agg = Aggregate::new("total", AggregateOp::Sum, "count");
        assert_eq!(agg.to_string(), "total:sum(count)");
    }
}
