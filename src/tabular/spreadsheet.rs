//! XLSX rendering.
//!
//! Writes a minimal single-sheet Office Open XML package by hand: the parts
//! are small, fixed XML documents and the sheet body is streamed into a
//! string, then everything is deflated into an in-memory zip. Strings are
//! stored inline (`t="inlineStr"`), so no shared-strings part is needed.
//!
//! Layout of the produced sheet:
//! - row 1 is the header: bold, light-grey fill, frozen;
//! - an auto-filter spans the header and every data row;
//! - column widths follow the longest rendered value, capped at
//!   [`MAX_COLUMN_WIDTH`];
//! - an empty RowSet produces a single `No data` row.

use serde_json::Value;
use std::io::{Cursor, Write as _};

use super::{header_columns, render_text, row_object};
use crate::error::ExportError;

/// Upper bound for any column width, in character units.
pub const MAX_COLUMN_WIDTH: usize = 50;

/// Sizing length of a blank or empty cell.
const BLANK_CELL_WIDTH: usize = 10;

const COLUMN_PADDING: usize = 2;

/// Single cell written when the RowSet is empty.
pub const EMPTY_SHEET_PLACEHOLDER: &str = "No data";

/// Excel refuses cells longer than this.
const MAX_CELL_CHARS: usize = 32_767;

const MAX_SHEET_NAME_CHARS: usize = 31;

/// Integers beyond 2^53 cannot round-trip through an IEEE double.
const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// `cellXfs` index of the header style in `styles.xml`.
const HEADER_STYLE: u32 = 1;

const CREATOR: &str = "Café export";

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

// ---------------------------------------------------------------------------
// Cell model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    /// Number already in its XML lexical form.
    Number(String),
    Bool(bool),
    Blank,
}

impl Cell {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Cell::Blank,
            Some(Value::Bool(b)) => Cell::Bool(*b),
            Some(Value::Number(n)) => {
                let unsafe_int = n
                    .as_i64()
                    .map(|i| i.unsigned_abs() > MAX_SAFE_INTEGER)
                    .or_else(|| n.as_u64().map(|u| u > MAX_SAFE_INTEGER))
                    .unwrap_or(false);
                if unsafe_int {
                    Cell::Text(n.to_string())
                } else {
                    Cell::Number(n.to_string())
                }
            }
            Some(other) => Cell::Text(render_text(Some(other))),
        }
    }

    /// Length used for column sizing.
    fn display_len(&self) -> usize {
        match self {
            Cell::Blank => BLANK_CELL_WIDTH,
            Cell::Text(s) if s.is_empty() => BLANK_CELL_WIDTH,
            Cell::Text(s) | Cell::Number(s) => s.chars().count(),
            Cell::Bool(true) => 4,
            Cell::Bool(false) => 5,
        }
    }
}

struct Sheet {
    rows: Vec<Vec<Cell>>,
    column_count: usize,
    has_header: bool,
}

impl Sheet {
    fn from_rows(rows: &[Value]) -> Result<Self, ExportError> {
        if rows.is_empty() {
            return Ok(Self {
                rows: vec![vec![Cell::Text(EMPTY_SHEET_PLACEHOLDER.to_string())]],
                column_count: 1,
                has_header: false,
            });
        }

        let columns = header_columns(rows)?;
        let mut out = Vec::with_capacity(rows.len() + 1);
        out.push(columns.iter().cloned().map(Cell::Text).collect());
        for (index, row) in rows.iter().enumerate() {
            let object = row_object(index, row)?;
            out.push(
                columns
                    .iter()
                    .map(|c| Cell::from_value(object.get(c)))
                    .collect(),
            );
        }

        Ok(Self {
            rows: out,
            column_count: columns.len(),
            has_header: true,
        })
    }

    fn column_widths(&self) -> Vec<usize> {
        (0..self.column_count)
            .map(|col| {
                let longest = self
                    .rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(Cell::display_len)
                    .max()
                    .unwrap_or(0);
                column_width(longest)
            })
            .collect()
    }

    /// `A1`-style reference of the bottom-right cell.
    fn last_cell(&self) -> String {
        format!(
            "{}{}",
            column_letter(self.column_count.max(1) - 1),
            self.rows.len()
        )
    }
}

/// Width for a column whose longest value has `longest` characters.
pub(crate) fn column_width(longest: usize) -> usize {
    longest.saturating_add(COLUMN_PADDING).min(MAX_COLUMN_WIDTH)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Render `rows` as a single-sheet XLSX workbook named `sheet_name`.
pub fn format_spreadsheet(rows: &[Value], sheet_name: &str) -> Result<Vec<u8>, ExportError> {
    let sheet = Sheet::from_rows(rows)?;
    let name = sanitize_sheet_name(sheet_name);

    let parts: [(&str, String); 7] = [
        ("[Content_Types].xml", content_types_xml()),
        ("_rels/.rels", root_rels_xml()),
        ("docProps/core.xml", core_props_xml()),
        ("xl/workbook.xml", workbook_xml(&name, &sheet)),
        ("xl/_rels/workbook.xml.rels", workbook_rels_xml()),
        ("xl/styles.xml", styles_xml()),
        ("xl/worksheets/sheet1.xml", worksheet_xml(&sheet)),
    ];

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    for (path, body) in parts {
        zip.start_file(path, options)?;
        zip.write_all(body.as_bytes())?;
    }
    Ok(zip.finish()?.into_inner())
}

/// Make `name` acceptable as an Excel sheet name: no `[]:*?/\`, no leading
/// or trailing apostrophe, 1–31 characters.
pub fn sanitize_sheet_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .take(MAX_SHEET_NAME_CHARS)
        .collect();
    let trimmed = cleaned.trim().trim_matches('\'');
    if trimmed.is_empty() {
        "Sheet1".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Zero-based column index → `A`, `B`, …, `Z`, `AA`, …
pub(crate) fn column_letter(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// XML parts
// ---------------------------------------------------------------------------

const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Escape text for element content / attribute values, dropping characters
/// XML 1.0 cannot carry and truncating to the per-cell limit.
fn xml_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars().take(MAX_CELL_CHARS) {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' | '\n' | '\r' => out.push(c),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

fn worksheet_xml(sheet: &Sheet) -> String {
    let mut xml = String::with_capacity(256 + sheet.rows.len() * sheet.column_count * 32);
    let last = sheet.last_cell();
    let dimension = if last == "A1" {
        last.clone()
    } else {
        format!("A1:{last}")
    };

    xml.push_str(&format!(
        r#"{XML_DECL}<worksheet xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><dimension ref="{dimension}"/>"#
    ));

    if sheet.has_header {
        xml.push_str(
            r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0"><pane ySplit="1" topLeftCell="A2" activePane="bottomLeft" state="frozen"/><selection pane="bottomLeft" activeCell="A2" sqref="A2"/></sheetView></sheetViews>"#,
        );
    } else {
        xml.push_str(r#"<sheetViews><sheetView tabSelected="1" workbookViewId="0"/></sheetViews>"#);
    }
    xml.push_str(r#"<sheetFormatPr defaultRowHeight="15"/>"#);

    xml.push_str("<cols>");
    for (index, width) in sheet.column_widths().into_iter().enumerate() {
        let n = index + 1;
        xml.push_str(&format!(
            r#"<col min="{n}" max="{n}" width="{width}" customWidth="1"/>"#
        ));
    }
    xml.push_str("</cols>");

    xml.push_str("<sheetData>");
    for (row_index, row) in sheet.rows.iter().enumerate() {
        let r = row_index + 1;
        let style = if sheet.has_header && row_index == 0 {
            format!(r#" s="{HEADER_STYLE}""#)
        } else {
            String::new()
        };
        xml.push_str(&format!(r#"<row r="{r}">"#));
        for (col_index, cell) in row.iter().enumerate() {
            let reference = format!("{}{r}", column_letter(col_index));
            match cell {
                Cell::Blank => {}
                Cell::Text(text) => {
                    xml.push_str(&format!(
                        r#"<c r="{reference}"{style} t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                        xml_escape(text)
                    ));
                }
                Cell::Number(n) => {
                    xml.push_str(&format!(r#"<c r="{reference}"{style}><v>{n}</v></c>"#));
                }
                Cell::Bool(b) => {
                    xml.push_str(&format!(
                        r#"<c r="{reference}"{style} t="b"><v>{}</v></c>"#,
                        u8::from(*b)
                    ));
                }
            }
        }
        xml.push_str("</row>");
    }
    xml.push_str("</sheetData>");

    if sheet.has_header {
        xml.push_str(&format!(r#"<autoFilter ref="A1:{last}"/>"#));
    }
    xml.push_str("</worksheet>");
    xml
}

fn workbook_xml(name: &str, sheet: &Sheet) -> String {
    let escaped = xml_escape(name);
    let defined_names = if sheet.has_header {
        let last = sheet.last_cell();
        let (col, row) = last.split_at(last.find(|c: char| c.is_ascii_digit()).unwrap_or(0));
        let quoted = xml_escape(&name.replace('\'', "''"));
        format!(
            r#"<definedNames><definedName name="_xlnm._FilterDatabase" localSheetId="0" hidden="1">'{quoted}'!$A$1:${col}${row}</definedName></definedNames>"#
        )
    } else {
        String::new()
    };
    format!(
        r#"{XML_DECL}<workbook xmlns="{NS_MAIN}" xmlns:r="{NS_REL}"><bookViews><workbookView/></bookViews><sheets><sheet name="{escaped}" sheetId="1" r:id="rId1"/></sheets>{defined_names}</workbook>"#
    )
}

fn content_types_xml() -> String {
    format!(
        r#"{XML_DECL}<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/><Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/></Types>"#
    )
}

fn root_rels_xml() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{NS_REL}/officeDocument" Target="xl/workbook.xml"/><Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/></Relationships>"#
    )
}

fn workbook_rels_xml() -> String {
    format!(
        r#"{XML_DECL}<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{NS_REL}/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="{NS_REL}/styles" Target="styles.xml"/></Relationships>"#
    )
}

fn core_props_xml() -> String {
    format!(
        r#"{XML_DECL}<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/"><dc:creator>{}</dc:creator></cp:coreProperties>"#,
        xml_escape(CREATOR)
    )
}

fn styles_xml() -> String {
    format!(
        r#"{XML_DECL}<styleSheet xmlns="{NS_MAIN}"><fonts count="2"><font><sz val="11"/><name val="Calibri"/><family val="2"/></font><font><b/><sz val="11"/><name val="Calibri"/><family val="2"/></font></fonts><fills count="3"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill><fill><patternFill patternType="solid"><fgColor rgb="FFE0E0E0"/><bgColor indexed="64"/></patternFill></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="2"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/><xf numFmtId="0" fontId="1" fillId="2" borderId="0" xfId="0" applyFont="1" applyFill="1"/></cellXfs><cellStyles count="1"><cellStyle name="Normal" xfId="0" builtinId="0"/></cellStyles></styleSheet>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Read as _;

    fn read_part(bytes: &[u8], path: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(path).unwrap();
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        out
    }

    fn widths(sheet_xml: &str) -> Vec<usize> {
        sheet_xml
            .split(r#" width=""#)
            .skip(1)
            .map(|rest| rest.split('"').next().unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_empty_rowset_has_single_placeholder_row() {
        let bytes = format_spreadsheet(&[], "sales").unwrap();
        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml");
        assert_eq!(sheet.matches("<row ").count(), 1);
        assert!(sheet.contains(EMPTY_SHEET_PLACEHOLDER));
        assert!(!sheet.contains("<autoFilter"));
    }

    #[test]
    fn test_package_has_all_parts() {
        let bytes = format_spreadsheet(&[json!({"id": 1})], "inventory").unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/styles.xml",
            "xl/worksheets/sheet1.xml",
            "docProps/core.xml",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
        let workbook = read_part(&bytes, "xl/workbook.xml");
        assert!(workbook.contains(r#"<sheet name="inventory""#));
    }

    #[test]
    fn test_header_is_styled_and_filtered() {
        let rows = vec![
            json!({"id": 1, "name": "Geisha", "price": 18.5}),
            json!({"id": 2, "name": "Bourbon", "price": 12}),
        ];
        let bytes = format_spreadsheet(&rows, "products").unwrap();
        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains(r#"<c r="A1" s="1" t="inlineStr">"#));
        assert!(sheet.contains(r#"<c r="A2"><v>1</v></c>"#));
        assert!(sheet.contains(r#"<autoFilter ref="A1:C3"/>"#));
        assert!(sheet.contains(r#"state="frozen""#));
        let workbook = read_part(&bytes, "xl/workbook.xml");
        assert!(workbook.contains("'products'!$A$1:$C$3"));
        let styles = read_part(&bytes, "xl/styles.xml");
        assert!(styles.contains("<b/>"));
        assert!(styles.contains(r#"rgb="FFE0E0E0""#));
    }

    #[test]
    fn test_cell_types() {
        let rows = vec![json!({
            "text": "a < b & c",
            "flag": false,
            "nothing": null,
            "nested": {"k": [1, 2]},
            "huge": 9007199254740993u64,
        })];
        let bytes = format_spreadsheet(&rows, "types").unwrap();
        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml");
        assert!(sheet.contains("a &lt; b &amp; c"));
        assert!(sheet.contains(r#"<c r="B2" t="b"><v>0</v></c>"#));
        assert!(!sheet.contains(r#"r="C2""#));
        assert!(sheet.contains("{&quot;k&quot;:[1,2]}"));
        assert!(sheet.contains(r#"<c r="E2" t="inlineStr"><is><t xml:space="preserve">9007199254740993</t>"#));
    }

    #[test]
    fn test_column_width_is_capped() {
        let long = "x".repeat(5_000);
        let rows = vec![json!({"id": 1, "notes": long, "note2": "short"})];
        let bytes = format_spreadsheet(&rows, "customers").unwrap();
        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml");
        let w = widths(&sheet);
        assert_eq!(w, vec![4, MAX_COLUMN_WIDTH, 7]);
        assert!(w.iter().all(|w| *w <= MAX_COLUMN_WIDTH));
    }

    #[test]
    fn test_blank_cells_size_as_ten() {
        let rows = vec![json!({"id": 1, "memo": null}), json!({"id": 2, "memo": ""})];
        let bytes = format_spreadsheet(&rows, "sales").unwrap();
        let sheet = read_part(&bytes, "xl/worksheets/sheet1.xml");
        assert_eq!(widths(&sheet), vec![4, BLANK_CELL_WIDTH + 2]);
    }

    #[test]
    fn test_column_width_bounds() {
        assert_eq!(column_width(2), 4);
        assert_eq!(column_width(20), 22);
        assert_eq!(column_width(48), 50);
        assert_eq!(column_width(usize::MAX / 2), MAX_COLUMN_WIDTH);
    }

    #[test]
    fn test_control_characters_are_stripped() {
        assert_eq!(xml_escape("a\u{0}b\u{1b}c\td"), "abc\td");
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_sanitize_sheet_name() {
        assert_eq!(sanitize_sheet_name("sales/2026:Q1"), "sales_2026_Q1");
        assert_eq!(sanitize_sheet_name(""), "Sheet1");
        assert_eq!(sanitize_sheet_name("'quoted'"), "quoted");
        assert_eq!(sanitize_sheet_name(&"a".repeat(40)).chars().count(), 31);
    }

    #[test]
    fn test_non_object_row_fails() {
        let err = format_spreadsheet(&[json!(42)], "bad").unwrap_err();
        assert!(matches!(err, ExportError::InvalidInput { row: 0, .. }));
    }
}
