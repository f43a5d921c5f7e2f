//! Result Serializer
//!
//! Renders a [`ResultTable`] in the highest-priority requested format:
//!
//! ```text
//! json > csv > html
//! ```
//!
//! The priority is fixed; the order formats appear in the request does not
//! matter. Endpoint header overrides are applied after the format headers.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

use crate::backend::{ResultTable, Value};
use crate::query::{OutputFormat, QueryError, QueryResult};

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_DISPOSITION: &str = "Content-Disposition";

/// A serialized response body with its headers
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedResponse {
    pub format: OutputFormat,
    pub body: Vec<u8>,
    /// Headers in insertion order; names compare case-insensitively
    pub headers: Vec<(String, String)>,
}

impl RenderedResponse {
    fn new(format: OutputFormat, body: Vec<u8>, content_type: &str) -> Self {
        Self {
            format,
            body,
            headers: vec![(CONTENT_TYPE.to_string(), content_type.to_string())],
        }
    }

    /// Replace a header, or append it if absent
    pub fn set_header(&mut self, name: &str, value: &str) {
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    /// Body as text (all formats are UTF-8)
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Render `table` in the best of `formats`, then apply `overrides`
pub fn render(
    table: &ResultTable,
    formats: &[String],
    overrides: &BTreeMap<String, String>,
) -> QueryResult<RenderedResponse> {
    let format = OutputFormat::choose(formats)
        .ok_or_else(|| QueryError::UnsupportedFormat(formats.to_vec()))?;

    let mut response = match format {
        OutputFormat::Json => RenderedResponse::new(format, to_json(table)?, "application/json"),
        OutputFormat::Csv => {
            let mut response = RenderedResponse::new(format, to_csv(table)?, "text/csv");
            response.set_header(CONTENT_DISPOSITION, "attachment; filename=file.csv");
            response
        }
        OutputFormat::Html => {
            RenderedResponse::new(format, to_html(table).into_bytes(), "text/html; charset=utf-8")
        }
    };

    for (name, value) in overrides {
        response.set_header(name, value);
    }

    tracing::debug!(format = format.tag(), rows = table.len(), "Rendered result");
    Ok(response)
}

/// One row serialized as an object in column order
struct Row<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl Serialize for Row<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

struct Records<'a>(&'a ResultTable);

impl Serialize for Records<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for values in &self.0.rows {
            seq.serialize_element(&Row {
                columns: &self.0.columns,
                values,
            })?;
        }
        seq.end()
    }
}

fn to_json(table: &ResultTable) -> QueryResult<Vec<u8>> {
    serde_json::to_vec(&Records(table)).map_err(|e| QueryError::Backend(e.to_string()))
}

fn to_csv(table: &ResultTable) -> QueryResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.columns)?;
    for row in &table.rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| QueryError::Backend(e.to_string()))
}

fn to_html(table: &ResultTable) -> String {
    let mut html = String::from("<table>\n<thead>\n<tr>");
    for column in &table.columns {
        html.push_str(&format!("<th>{}</th>", escape_html(column)));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in &table.rows {
        html.push_str("<tr>");
        for value in row {
            html.push_str(&format!("<td>{}</td>", escape_html(&value.to_string())));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
