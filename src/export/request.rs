//! Export request parsing and validation.
//!
//! The caller hands us loosely typed JSON; [`ExportRequest::validate`] turns
//! it into an [`ExportPlan`] whose tables, format and date range are known to
//! be well formed before any backend call is made.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExportError;

pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Backend tables an admin may export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportTable {
    Inventory,
    Sales,
    SaleItems,
    Customers,
    CustomerContacts,
    Products,
    ProductVariants,
    Profiles,
}

impl ExportTable {
    pub const ALL: [ExportTable; 8] = [
        ExportTable::Inventory,
        ExportTable::Sales,
        ExportTable::SaleItems,
        ExportTable::Customers,
        ExportTable::CustomerContacts,
        ExportTable::Products,
        ExportTable::ProductVariants,
        ExportTable::Profiles,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportTable::Inventory => "inventory",
            ExportTable::Sales => "sales",
            ExportTable::SaleItems => "sale_items",
            ExportTable::Customers => "customers",
            ExportTable::CustomerContacts => "customer_contacts",
            ExportTable::Products => "products",
            ExportTable::ProductVariants => "product_variants",
            ExportTable::Profiles => "profiles",
        }
    }

    /// Column a date-range filter applies to.
    pub fn date_column(self) -> &'static str {
        match self {
            ExportTable::Customers => "last_purchase_date",
            ExportTable::CustomerContacts => "contacted_at",
            _ => "created_at",
        }
    }
}

impl fmt::Display for ExportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportTable {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ExportTable::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| ExportError::validation(format!("Invalid table: {wanted}")))
    }
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => CSV_CONTENT_TYPE,
            ExportFormat::Xlsx => XLSX_CONTENT_TYPE,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            _ => Err(ExportError::validation(
                "Invalid format. Use \"csv\" or \"xlsx\"",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// Inclusive timestamp window applied to each table's date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates. A bare end date
/// covers the whole day.
fn parse_bound(raw: &str, bound: Bound) -> Result<DateTime<Utc>, ExportError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ExportError::validation(format!("Invalid date: {raw}")))?;
    let start_of_day = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    match bound {
        Bound::Start => Ok(start_of_day),
        Bound::End => start_of_day
            .checked_add_signed(Duration::days(1))
            .and_then(|d| d.checked_sub_signed(Duration::milliseconds(1)))
            .ok_or_else(|| ExportError::validation(format!("Invalid date: {raw}"))),
    }
}

impl DateRange {
    pub fn parse(start: &str, end: &str) -> Result<Self, ExportError> {
        let start = parse_bound(start, Bound::Start)?;
        let end = parse_bound(end, Bound::End)?;
        if start > end {
            return Err(ExportError::validation(
                "Invalid date range: start is after end",
            ));
        }
        Ok(Self { start, end })
    }
}

// ---------------------------------------------------------------------------
// Request / plan
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDateRange {
    pub start: String,
    pub end: String,
}

/// Caller-supplied export request, as received on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default, alias = "date_range")]
    pub date_range: Option<RawDateRange>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub tables: Vec<ExportTable>,
    pub format: ExportFormat,
    pub date_range: Option<DateRange>,
}

impl ExportRequest {
    pub fn new(tables: &[&str], format: &str) -> Self {
        Self {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            format: format.to_string(),
            date_range: None,
        }
    }

    pub fn with_date_range(mut self, start: &str, end: &str) -> Self {
        self.date_range = Some(RawDateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
        self
    }

    pub fn validate(&self) -> Result<ExportPlan, ExportError> {
        if self.tables.is_empty() {
            return Err(ExportError::validation(
                "At least one table must be selected",
            ));
        }
        let tables = self
            .tables
            .iter()
            .map(|t| t.parse::<ExportTable>())
            .collect::<Result<Vec<_>, _>>()?;
        let format = self.format.parse::<ExportFormat>()?;
        let date_range = self
            .date_range
            .as_ref()
            .map(|r| DateRange::parse(&r.start, &r.end))
            .transpose()?;
        Ok(ExportPlan {
            tables,
            format,
            date_range,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trips_through_name() {
        for table in ExportTable::ALL {
            assert_eq!(table.as_str().parse::<ExportTable>().unwrap(), table);
        }
    }

    #[test]
    fn test_date_columns() {
        assert_eq!(ExportTable::Sales.date_column(), "created_at");
        assert_eq!(ExportTable::Customers.date_column(), "last_purchase_date");
        assert_eq!(ExportTable::CustomerContacts.date_column(), "contacted_at");
    }

    #[test]
    fn test_empty_tables_rejected() {
        let err = ExportRequest::new(&[], "csv").validate().unwrap_err();
        assert!(matches!(err, ExportError::Validation(_)));
    }

    #[test]
    fn test_unknown_table_rejected() {
        let err = ExportRequest::new(&["sales", "passwords"], "csv")
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid table: passwords");
    }

    #[test]
    fn test_unknown_or_missing_format_rejected() {
        for format in ["pdf", ""] {
            let err = ExportRequest::new(&["sales"], format)
                .validate()
                .unwrap_err();
            assert!(matches!(err, ExportError::Validation(_)), "{format}");
        }
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = ExportRequest::new(&["sales"], "csv")
            .with_date_range("2026-02-01", "2026-01-01")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ExportError::Validation(_)));
    }

    #[test]
    fn test_unparsable_date_rejected() {
        let err = ExportRequest::new(&["sales"], "csv")
            .with_date_range("yesterday", "2026-01-01")
            .validate()
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid date: yesterday");
    }

    #[test]
    fn test_end_date_at_calendar_limit_rejected() {
        let err = ExportRequest::new(&["sales"], "csv")
            .with_date_range("2026-01-01", "+262142-12-31")
            .validate()
            .unwrap_err();
        assert!(matches!(err, ExportError::Validation(_)));
        assert_eq!(err.to_string(), "Invalid date: +262142-12-31");
    }

    #[test]
    fn test_same_day_range_covers_whole_day() {
        let plan = ExportRequest::new(&["sales"], "xlsx")
            .with_date_range("2026-01-01", "2026-01-01")
            .validate()
            .unwrap();
        let range = plan.date_range.unwrap();
        assert_eq!(range.start.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(
            range.end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2026-01-01T23:59:59.999Z"
        );
    }

    #[test]
    fn test_rfc3339_bounds_are_kept() {
        let range = DateRange::parse("2026-01-01T08:00:00-05:00", "2026-01-02T00:00:00Z").unwrap();
        assert_eq!(range.start.to_rfc3339(), "2026-01-01T13:00:00+00:00");
        assert_eq!(range.end.to_rfc3339(), "2026-01-02T00:00:00+00:00");
    }

    #[test]
    fn test_request_deserializes_from_wire_json() {
        let req: ExportRequest = serde_json::from_str(
            r#"{"tables":["sales","customers"],"format":"XLSX","dateRange":{"start":"2026-01-01","end":"2026-01-31"}}"#,
        )
        .unwrap();
        let plan = req.validate().unwrap();
        assert_eq!(
            plan.tables,
            vec![ExportTable::Sales, ExportTable::Customers]
        );
        assert_eq!(plan.format, ExportFormat::Xlsx);
        assert!(plan.date_range.is_some());
    }
}
