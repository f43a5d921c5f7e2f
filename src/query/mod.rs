//! Tablegate Query Layer
//!
//! Turns URL parameters into a backend-agnostic [`QuerySpec`]:
//!
//! - **AST**: Query spec, predicate, aggregate and sort types
//! - **Parser**: Parse single `where` / `agg` values
//! - **Builder**: Merge request parameters with configured overrides
//!
//! # Parameter Vocabulary
//!
//! ```text
//! select=col            output columns (repeatable)
//! where=col OP value    filters, ANDed (repeatable)
//! groupby=col           group columns (repeatable)
//! agg=name:op(col)      aggregates (repeatable)
//! sort=col[:asc|:desc]  sort keys (repeatable)
//! offset=n, limit=n     pagination (first value only)
//! format=json|csv|html  output format, json > csv > html
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tablegate::query::{QueryOverrides, RequestParams};
//!
//! let params = RequestParams::parse("groupby=country&agg=total:sum(count)&sort=total:desc");
//! let spec = QueryOverrides::default().build_spec(&params)?;
//! assert!(spec.is_aggregated());
//! ```

mod ast;
mod builder;
mod error;
mod parser;

pub use ast::{
    Aggregate, AggregateOp, Operator, OutputFormat, Predicate, QuerySpec, Sort, SortDirection,
};
pub use builder::{ParamOverrides, QueryOverrides, RequestParams};
pub use error::{QueryError, QueryResult};
pub use parser::{parse_aggregate, parse_predicate};
