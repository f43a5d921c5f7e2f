//! Parameter Parsers
//!
//! Parses single `where` and `agg` parameter values into typed AST nodes.
//!
//! # Supported Syntax
//!
//! ```text
//! where:  column OP value      OP = '=' | '==' | '!=' | '>' | '>=' | '<' | '<=' | '~' | '!~'
//! agg:    name ':' op '(' column ')'
//! ```
//!
//! Strings that do not match are skipped, not rejected: both parsers return
//! `None` for them and the caller leaves them out of the query.

use nom::{
    bytes::complete::{take_till1, take_while1},
    character::complete::{alpha1, char},
    combinator::map_opt,
    IResult,
};

use crate::query::ast::{Aggregate, AggregateOp, Operator, Predicate};
use crate::query::error::{QueryError, QueryResult};

/// Parse a `where` value such as `country=US` or `name~bob`
pub fn parse_predicate(input: &str) -> Option<Predicate> {
    match predicate(input) {
        Ok((value, (column, op))) if !value.is_empty() => {
            Some(Predicate::new(column, op, value))
        }
        _ => {
            tracing::debug!(filter = %input, "Skipping malformed where clause");
            None
        }
    }
}

/// Column and operator; the remaining input is the value
fn predicate(input: &str) -> IResult<&str, (&str, Operator)> {
    let (input, column) = take_till1(is_operator_char)(input)?;
    let (input, op) = parse_operator(input)?;
    Ok((input, (column, op)))
}

/// Parse the maximal run of operator characters as one token
fn parse_operator(input: &str) -> IResult<&str, Operator> {
    map_opt(take_while1(is_operator_char), Operator::from_token)(input)
}

fn is_operator_char(c: char) -> bool {
    Operator::CHARS.contains(&c)
}

/// Parse an `agg` value such as `total:sum(count)`
///
/// Returns `Ok(None)` for strings that do not have the `name:op(col)` shape
/// and `Err(UnknownAggregateOperator)` when the shape matches but `op` is not
/// one of `min`, `max`, `sum`, `count`, `mean`, `nunique`.
pub fn parse_aggregate(input: &str) -> QueryResult<Option<Aggregate>> {
    let (name, op, column) = match aggregate(input) {
        Ok((_, parts)) => parts,
        Err(_) => {
            tracing::debug!(agg = %input, "Skipping malformed aggregate");
            return Ok(None);
        }
    };

    let op = AggregateOp::from_name(op)
        .ok_or_else(|| QueryError::UnknownAggregateOperator(op.to_string()))?;

    Ok(Some(Aggregate::new(name, op, column)))
}

/// `name:op(column)`, trailing input ignored
fn aggregate(input: &str) -> IResult<&str, (&str, &str, &str)> {
    let (input, name) = take_till1(|c| c == ':')(input)?;
    let (input, _) = char(':')(input)?;
    let (input, op) = alpha1(input)?;
    let (input, _) = char('(')(input)?;
    let (input, column) = take_till1(|c| c == ')' || c == ':')(input)?;
    let (input, _) = char(')')(input)?;
    Ok((input, (name, op, column)))
}
