//! Tabular formatter: RowSet → CSV text or XLSX workbook bytes.
//!
//! A RowSet is the JSON array PostgREST returns for one table. Each row must
//! be a JSON object; the header is the key order of the first row. Rows with
//! fewer keys render blanks, keys that only appear in later rows are dropped.
//!
//! Nested values (objects / arrays) are flattened to compact JSON text in
//! both formats. Their original structure is not recoverable from the
//! output.

pub mod delimited;
pub mod spreadsheet;

use serde_json::{Map, Value};

use crate::error::ExportError;

pub use delimited::format_delimited;
pub use spreadsheet::{format_spreadsheet, MAX_COLUMN_WIDTH};

/// One table's query result.
pub type RowSet = Vec<Value>;

/// Borrow row `index` as a JSON object.
pub(crate) fn row_object(index: usize, row: &Value) -> Result<&Map<String, Value>, ExportError> {
    row.as_object().ok_or_else(|| ExportError::InvalidInput {
        row: index,
        detail: format!("expected an object, got {}", value_kind(row)),
    })
}

/// Column names taken from the first row, in its key order.
pub(crate) fn header_columns(rows: &[Value]) -> Result<Vec<String>, ExportError> {
    match rows.first() {
        Some(first) => Ok(row_object(0, first)?.keys().cloned().collect()),
        None => Ok(Vec::new()),
    }
}

/// Text form of a cell, as written to CSV and used for column sizing.
pub(crate) fn render_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
