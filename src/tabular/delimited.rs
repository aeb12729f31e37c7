//! CSV rendering.

use csv::{QuoteStyle, Terminator, WriterBuilder};
use serde_json::Value;

use super::{header_columns, render_text, row_object};
use crate::error::ExportError;

/// Render `rows` as CSV: one header record from the first row's keys, then
/// one record per row. An empty RowSet yields an empty string.
///
/// Fields are quoted only when they contain a comma, quote, CR or LF, so any
/// RFC 4180 reader gets the original string values back.
pub fn format_delimited(rows: &[Value]) -> Result<String, ExportError> {
    if rows.is_empty() {
        return Ok(String::new());
    }

    let columns = header_columns(rows)?;
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::CRLF)
        .from_writer(Vec::new());

    writer.write_record(&columns)?;
    for (index, row) in rows.iter().enumerate() {
        let object = row_object(index, row)?;
        writer.write_record(columns.iter().map(|c| render_text(object.get(c))))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))?;
    String::from_utf8(bytes).map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))
}
